use bitflags::bitflags;

bitflags! {
    /// Access flags of classes, fields and methods.
    ///
    /// The class file reuses some bit positions with a different meaning per
    /// item kind (`SUPER`/`SYNCHRONIZED`, `VOLATILE`/`BRIDGE`,
    /// `TRANSIENT`/`VARARGS`), so those pairs share a value here.
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    pub fn is_public(&self) -> bool {
        self.contains(AccessFlags::PUBLIC)
    }

    pub fn is_private(&self) -> bool {
        self.contains(AccessFlags::PRIVATE)
    }

    pub fn is_static(&self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.contains(AccessFlags::FINAL)
    }

    pub fn is_native(&self) -> bool {
        self.contains(AccessFlags::NATIVE)
    }

    pub fn is_interface(&self) -> bool {
        self.contains(AccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.contains(AccessFlags::ABSTRACT)
    }

    pub fn is_synthetic(&self) -> bool {
        self.contains(AccessFlags::SYNTHETIC)
    }

    pub fn is_annotation(&self) -> bool {
        self.contains(AccessFlags::ANNOTATION)
    }

    pub fn is_enum(&self) -> bool {
        self.contains(AccessFlags::ENUM)
    }

    pub fn is_module(&self) -> bool {
        self.contains(AccessFlags::MODULE)
    }
}
