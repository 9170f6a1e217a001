mod common;

use std::{cell::RefCell, rc::Rc};

use just_class_assembler::{
    ClassAssembler, Code, ElementConst, ACC_ABSTRACT, ACC_ANNOTATION, ACC_INTERFACE, ACC_PUBLIC,
    ACC_STATIC, ACC_SUPER,
};
use just_class_file::{
    attributes::{ElementValue, ElementValuePair},
    constant_pool::Constant,
    opcodes::*,
};
use just_vm::{
    AnnotationHandler, AnnotationTarget, ErrorKind, InitState, LinkError, LoaderId, Result,
    Value, Vm, VmOptions,
};

/// `my/Counter` with a static `COUNT` that its `<clinit>` increments.
fn counter() -> Vec<u8> {
    let mut class = common::class("my/Counter");
    class.field(ACC_PUBLIC | ACC_STATIC, "COUNT", "I");
    let count = class.pool().field_ref("my/Counter", "COUNT", "I");
    let mut clinit = Code::new(2, 0);
    clinit
        .op_u2(GETSTATIC, count)
        .op(ICONST_1)
        .op(IADD)
        .op_u2(PUTSTATIC, count)
        .op(RETURN);
    class.method(ACC_STATIC, "<clinit>", "()V", Some(clinit));
    class.assemble().unwrap()
}

fn count(vm: &Vm) -> i32 {
    let class = vm.load_class("my/Counter").unwrap();
    match class.get_static_attribute(vm, "COUNT").unwrap() {
        Value::Int(i) => i,
        other => panic!("COUNT is {:?}", other),
    }
}

#[test]
fn test_static_init_runs_once() {
    let vm = common::vm_with(vec![("my/Counter", counter())]);
    let class = vm.load_class("my/Counter").unwrap();
    assert_eq!(count(&vm), 0);

    class.prepare_use(&vm).unwrap();
    class.prepare_use(&vm).unwrap();

    assert_eq!(count(&vm), 1);
    assert_eq!(class.init_state(), InitState::Done);
}

#[test]
fn test_static_init_on_first_getstatic() {
    let mut main = common::class("my/Main");
    let count_ref = main.pool().field_ref("my/Counter", "COUNT", "I");
    let mut code = Code::new(2, 0);
    code.op_u2(GETSTATIC, count_ref)
        .op_u2(GETSTATIC, count_ref)
        .op(IADD)
        .op(IRETURN);
    main.method(ACC_PUBLIC | ACC_STATIC, "run", "()I", Some(code));
    let vm = common::vm_with(vec![
        ("my/Counter", counter()),
        ("my/Main", main.assemble().unwrap()),
    ]);

    assert_eq!(common::int(common::run(&vm, "my/Main", "()I", vec![]).unwrap()), 2);
}

#[test]
fn test_static_init_disabled() {
    let options = VmOptions {
        run_static_init: false,
        ..VmOptions::default()
    };
    let vm = common::vm_with_options(vec![("my/Counter", counter())], options);
    let class = vm.load_class("my/Counter").unwrap();

    class.prepare_use(&vm).unwrap();

    assert_eq!(count(&vm), 0);
    assert_eq!(class.init_state(), InitState::Done);
}

/// `<clinit>` of `class` doing `my/Parent.LOG = LOG * 10 + digit`.
fn logging_class(mut class: ClassAssembler, digit: i8) -> Vec<u8> {
    let log = class.pool().field_ref("my/Parent", "LOG", "I");
    let mut clinit = Code::new(2, 0);
    clinit
        .op_u2(GETSTATIC, log)
        .op_i1(BIPUSH, 10)
        .op(IMUL)
        .op_i1(BIPUSH, digit)
        .op(IADD)
        .op_u2(PUTSTATIC, log)
        .op(RETURN);
    class.method(ACC_STATIC, "<clinit>", "()V", Some(clinit));
    class.assemble().unwrap()
}

#[test]
fn test_parent_initialized_first() {
    let mut parent = common::class("my/Parent");
    parent.field(ACC_PUBLIC | ACC_STATIC, "LOG", "I");
    let parent = logging_class(parent, 1);
    let child = logging_class(
        common::subclass("my/Child", "my/Parent", ACC_PUBLIC | ACC_SUPER),
        2,
    );
    let vm = common::vm_with(vec![("my/Parent", parent), ("my/Child", child)]);

    let child = vm.load_class("my/Child").unwrap();
    child.prepare_use(&vm).unwrap();

    let log = child.get_static_attribute(&vm, "LOG").unwrap();
    assert!(matches!(log, Value::Int(12)));
}

#[test]
fn test_parents_are_queued() {
    let parent = common::class("my/Parent").assemble().unwrap();
    let child = common::subclass("my/Child", "my/Parent", ACC_PUBLIC | ACC_SUPER)
        .assemble()
        .unwrap();
    let vm = common::vm_with(vec![("my/Parent", parent), ("my/Child", child)]);

    let child = vm.load_class("my/Child").unwrap();
    assert!(!vm.is_loaded(LoaderId::DEFAULT, "my/Parent"));
    assert!(!child.parent.as_ref().unwrap().is_resolved());
    assert!(vm.pending_count() > 0);

    assert!(vm.load_all_pending().unwrap() >= 1);
    assert!(vm.is_loaded(LoaderId::DEFAULT, "my/Parent"));
    assert_eq!(vm.pending_count(), 0);
}

#[test]
fn test_lazy_reference() {
    let parent = common::class("my/Parent").assemble().unwrap();
    let vm = common::vm_with(vec![("my/Parent", parent)]);

    let lazy = vm.load_lazy(LoaderId::DEFAULT, "my.Parent").unwrap();
    assert!(!lazy.is_resolved());
    assert_eq!(&**lazy.name(), "my/Parent");

    let class = lazy.get(&vm).unwrap();
    assert_eq!(&*class.name, "my/Parent");
    assert!(lazy.is_resolved());

    let missing = vm.load_lazy(LoaderId::DEFAULT, "my/Missing").unwrap();
    assert!(missing.try_get(&vm).unwrap().is_none());
}

#[test]
fn test_class_not_found() {
    let vm = common::vm_with(vec![]);
    let e = vm.load_class("my/Missing").unwrap_err();
    assert!(matches!(
        e.kind(),
        ErrorKind::Link(LinkError::ClassNotFound(name)) if name == "my/Missing"
    ));
}

#[test]
fn test_class_file_under_the_wrong_name() {
    let vm = common::vm_with(vec![("my/Other", common::class("my/Parent").assemble().unwrap())]);
    let e = vm.load_class("my/Other").unwrap_err();
    assert!(matches!(e.kind(), ErrorKind::Link(LinkError::ClassNotFound(_))));
}

fn answer(name: &str, value: i8) -> Vec<u8> {
    let mut code = Code::new(1, 0);
    code.op_i1(BIPUSH, value).op(IRETURN);
    common::runner(name, "()I", code)
}

#[test]
fn test_loaders_are_separate_scopes() {
    let vm = common::vm_with(vec![("my/Answer", answer("my/Answer", 1))]);
    let other = vm.add_loader(common::source(vec![("my/Answer", answer("my/Answer", 2))]));

    let first = vm.load_class("my/Answer").unwrap();
    let second = vm.load_class_in(other, "my/Answer").unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.loader, other);

    let run = |class: &just_vm::Class| {
        let method = class.get_method(&vm, "run", "()I").unwrap();
        common::int(vm.runtime().run_method(&vm, &method, vec![]).unwrap())
    };
    assert_eq!(run(&first), 1);
    assert_eq!(run(&second), 2);

    let object = vm.load_class_in(other, "java/lang/Object").unwrap();
    assert_eq!(object.loader, LoaderId::SHARED);
    assert_eq!(object.id, vm.load_class("java/lang/Object").unwrap().id);
}

#[test]
fn test_queued_classes_keep_their_loader() {
    let vm = common::vm_with(vec![("my/Answer", answer("my/Answer", 1))]);
    let other = vm.add_loader(common::source(vec![("my/Answer", answer("my/Answer", 2))]));

    vm.load_lazy(other, "my/Answer").unwrap();
    vm.load_class("my/Answer").unwrap();
    assert!(!vm.is_loaded(other, "my/Answer"));

    vm.load_all_pending().unwrap();
    assert!(vm.is_loaded(other, "my/Answer"));
    assert_eq!(vm.pending_count(), 0);
}

struct Recorder(Rc<RefCell<Vec<String>>>);

impl AnnotationHandler for Recorder {
    fn on_annotate(
        &self,
        _vm: &Vm,
        target: AnnotationTarget<'_>,
        elements: &[ElementValuePair],
    ) -> Result<()> {
        for element in elements {
            if let ElementValue::Const(_, Constant::String(value)) = &element.value {
                self.0
                    .borrow_mut()
                    .push(format!("{} {}={}", target, element.name, value));
            }
        }
        Ok(())
    }
}

#[test]
fn test_annotation_handler() {
    let mut class = common::class("my/Service");
    let marker = class.annotation(
        "Lmy/Marker;",
        &[("name", ElementConst::String("greeter".to_owned()))],
    );
    class.annotate(marker);
    let vm = common::vm_with(vec![("my/Service", class.assemble().unwrap())]);
    let seen = Rc::new(RefCell::new(Vec::new()));
    vm.register_annotation_handler("my.Marker", Recorder(seen.clone()));

    vm.load_class("my/Service").unwrap();

    assert_eq!(*seen.borrow(), vec!["class my/Service name=greeter".to_owned()]);
}

#[test]
fn test_annotation_classes_are_resolved() {
    let marker = ClassAssembler::new(
        "my/Marker",
        Some("java/lang/Object"),
        ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT | ACC_ANNOTATION,
    );
    let mut class = common::class("my/Service");
    let annotation = class.annotation(
        "Lmy/Marker;",
        &[("name", ElementConst::String("greeter".to_owned()))],
    );
    class.annotate(annotation);
    let vm = common::vm_with(vec![
        ("my/Marker", marker.assemble().unwrap()),
        ("my/Service", class.assemble().unwrap()),
    ]);
    let seen = Rc::new(RefCell::new(Vec::new()));
    vm.register_annotation_handler("my/Marker", Recorder(seen.clone()));

    vm.load_class("my/Service").unwrap();

    assert!(vm.is_loaded(LoaderId::DEFAULT, "my/Marker"));
    assert_eq!(seen.borrow().len(), 1);
}
