use std::{
    cell::RefCell,
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::{trace, warn};

/// Supplies the bytes of class files and resources.
///
/// Class names are given in internal (slash separated) form, see
/// [`normalize_class_name`].
pub trait ClassSource {
    fn read_class(&self, name: &str) -> Option<Vec<u8>>;

    fn read_resource(&self, path: &str) -> Option<Vec<u8>>;
}

/// Internal form of a class name: dots become slashes and a `L...;`
/// descriptor wrapper is removed.
pub fn normalize_class_name(name: &str) -> String {
    let name = match name.strip_prefix('L').and_then(|n| n.strip_suffix(';')) {
        Some(inner) => inner,
        None => name,
    };
    name.replace('.', "/")
}

/// Classes and resources held in memory.
#[derive(Default, Debug)]
pub struct MemorySource {
    classes: HashMap<String, Vec<u8>>,
    resources: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_class(&mut self, name: &str, bytes: Vec<u8>) {
        self.classes.insert(normalize_class_name(name), bytes);
    }

    pub fn insert_resource(&mut self, path: &str, bytes: Vec<u8>) {
        self.resources.insert(path.to_owned(), bytes);
    }

    pub fn with_class(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.insert_class(name, bytes);
        self
    }
}

impl ClassSource for MemorySource {
    fn read_class(&self, name: &str) -> Option<Vec<u8>> {
        self.classes.get(&normalize_class_name(name)).cloned()
    }

    fn read_resource(&self, path: &str) -> Option<Vec<u8>> {
        self.resources.get(path).cloned()
    }
}

/// Class files laid out in directories following their package.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn read(&self, relative: &str) -> Option<Vec<u8>> {
        let path = self.root.join(relative);
        match fs::read(&path) {
            Ok(bytes) => {
                trace!("read {}", path.display());
                Some(bytes)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("could not read {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl ClassSource for DirectorySource {
    fn read_class(&self, name: &str) -> Option<Vec<u8>> {
        self.read(&format!("{}.class", normalize_class_name(name)))
    }

    fn read_resource(&self, path: &str) -> Option<Vec<u8>> {
        self.read(path.trim_start_matches('/'))
    }
}

/// Asks each source in turn, the first hit wins.
#[derive(Default)]
pub struct ChainedSource {
    sources: Vec<Box<dyn ClassSource>>,
}

impl ChainedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, source: impl ClassSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl ClassSource for ChainedSource {
    fn read_class(&self, name: &str) -> Option<Vec<u8>> {
        self.sources.iter().find_map(|s| s.read_class(name))
    }

    fn read_resource(&self, path: &str) -> Option<Vec<u8>> {
        self.sources.iter().find_map(|s| s.read_resource(path))
    }
}

/// Remembers every lookup of the wrapped source, misses included.
pub struct CachingSource<S> {
    inner: S,
    classes: RefCell<HashMap<String, Option<Vec<u8>>>>,
    resources: RefCell<HashMap<String, Option<Vec<u8>>>>,
}

impl<S: ClassSource> CachingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            classes: RefCell::new(HashMap::new()),
            resources: RefCell::new(HashMap::new()),
        }
    }
}

impl<S: ClassSource> ClassSource for CachingSource<S> {
    fn read_class(&self, name: &str) -> Option<Vec<u8>> {
        let name = normalize_class_name(name);
        if let Some(cached) = self.classes.borrow().get(&name) {
            return cached.clone();
        }
        let bytes = self.inner.read_class(&name);
        self.classes.borrow_mut().insert(name, bytes.clone());
        bytes
    }

    fn read_resource(&self, path: &str) -> Option<Vec<u8>> {
        if let Some(cached) = self.resources.borrow().get(path) {
            return cached.clone();
        }
        let bytes = self.inner.read_resource(path);
        self.resources
            .borrow_mut()
            .insert(path.to_owned(), bytes.clone());
        bytes
    }
}


#[cfg(test)]
mod source_tests {
    use std::rc::Rc;

    use super::*;

    struct Counting {
        inner: MemorySource,
        hits: Rc<RefCell<usize>>,
    }

    impl ClassSource for Counting {
        fn read_class(&self, name: &str) -> Option<Vec<u8>> {
            *self.hits.borrow_mut() += 1;
            self.inner.read_class(name)
        }

        fn read_resource(&self, path: &str) -> Option<Vec<u8>> {
            self.inner.read_resource(path)
        }
    }

    #[test]
    fn it_should_chain_sources_in_order() {
        let chained = ChainedSource::new()
            .push(MemorySource::new().with_class("a/A", vec![1]))
            .push(
                MemorySource::new()
                    .with_class("a/A", vec![2])
                    .with_class("b/B", vec![3]),
            );
        assert_eq!(chained.read_class("a.A"), Some(vec![1]));
        assert_eq!(chained.read_class("b/B"), Some(vec![3]));
        assert_eq!(chained.read_class("c/C"), None);
    }

    #[test]
    fn it_should_cache_hits_and_misses() {
        let hits = Rc::new(RefCell::new(0));
        let caching = CachingSource::new(Counting {
            inner: MemorySource::new().with_class("a/A", vec![1]),
            hits: hits.clone(),
        });
        for _ in 0..3 {
            assert_eq!(caching.read_class("a/A"), Some(vec![1]));
            assert_eq!(caching.read_class("x/X"), None);
        }
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn it_should_read_resources_from_memory() {
        let mut source = MemorySource::new();
        source.insert_resource("META-INF/mods.toml", b"x".to_vec());
        assert_eq!(source.read_resource("META-INF/mods.toml"), Some(b"x".to_vec()));
        assert_eq!(source.read_resource("missing"), None);
    }
}
