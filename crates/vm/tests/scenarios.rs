mod common;

use just_class_assembler::{
    Code, ACC_ABSTRACT, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC, ACC_SUPER,
};
use just_class_file::opcodes::*;
use just_vm::{Fault, InitState, Value};

#[test]
fn test_constant_value_without_static_init() {
    let mut class = common::class("my/Constants");
    let forty_two = class.pool().integer(42);
    class.field(ACC_PUBLIC | ACC_STATIC, "X", "I").constant_value = Some(forty_two);
    class.field(ACC_PRIVATE, "y", "I");
    let x = class.pool().field_ref("my/Constants", "X", "I");
    let mut clinit = Code::new(1, 0);
    clinit.op_i1(BIPUSH, 7).op_u2(PUTSTATIC, x).op(RETURN);
    class.method(ACC_STATIC, "<clinit>", "()V", Some(clinit));

    let vm = common::vm_with(vec![("my/Constants", class.assemble().unwrap())]);
    let class = vm.load_class("my/Constants").unwrap();

    assert!(class.is_baked());
    assert_eq!(class.init_state(), InitState::Pending);
    assert!(matches!(
        class.get_static_attribute(&vm, "X"),
        Ok(Value::Int(42))
    ));
    assert!(class.get_static_attribute(&vm, "y").is_err());

    class.prepare_use(&vm).unwrap();
    assert!(matches!(
        class.get_static_attribute(&vm, "X"),
        Ok(Value::Int(7))
    ));
}

#[test]
fn test_add_two_constants() {
    let mut code = Code::new(2, 0);
    code.op(ICONST_2).op(ICONST_3).op(IADD).op(IRETURN);
    let vm = common::vm_with(vec![("my/Add", common::runner("my/Add", "()I", code))]);

    assert_eq!(common::int(common::run(&vm, "my/Add", "()I", vec![]).unwrap()), 5);
}

#[test]
fn test_conditional_branch() {
    let mut code = Code::new(1, 1);
    let negative = code.new_label();
    let end = code.new_label();
    code.op(ILOAD_0)
        .branch(IFLE, negative)
        .op(ICONST_1)
        .branch(GOTO, end)
        .place(negative)
        .op(ICONST_0)
        .place(end)
        .op(IRETURN);
    let vm = common::vm_with(vec![("my/Sign", common::runner("my/Sign", "(I)I", code))]);

    let positive = common::run(&vm, "my/Sign", "(I)I", vec![Value::Int(5)]).unwrap();
    assert_eq!(common::int(positive), 1);
    let negative = common::run(&vm, "my/Sign", "(I)I", vec![Value::Int(-1)]).unwrap();
    assert_eq!(common::int(negative), 0);
}

#[test]
fn test_table_switch() {
    let mut code = Code::new(1, 1);
    let a = code.new_label();
    let b = code.new_label();
    let c = code.new_label();
    let default = code.new_label();
    code.op(ILOAD_0).table_switch(default, 0, &[a, b, c]);
    code.place(a).op_i1(BIPUSH, 10).op(IRETURN);
    code.place(b).op_i1(BIPUSH, 11).op(IRETURN);
    code.place(c).op_i1(BIPUSH, 12).op(IRETURN);
    code.place(default).op(ICONST_M1).op(IRETURN);
    let vm = common::vm_with(vec![("my/Switch", common::runner("my/Switch", "(I)I", code))]);

    let run = |key| common::int(common::run(&vm, "my/Switch", "(I)I", vec![Value::Int(key)]).unwrap());
    assert_eq!(run(0), 10);
    assert_eq!(run(1), 11);
    assert_eq!(run(2), 12);
    assert_eq!(run(5), -1);
    assert_eq!(run(-1), -1);
}

#[test]
fn test_new_on_abstract_class() {
    let shape = common::subclass("my/Shape", "java/lang/Object", ACC_PUBLIC | ACC_SUPER | ACC_ABSTRACT);

    let mut main = common::class("my/Main");
    let shape_class = main.pool().class("my/Shape");
    let init = main.pool().method_ref("my/Shape", "<init>", "()V");
    let mut code = Code::new(2, 0);
    code.op_u2(NEW, shape_class)
        .op(DUP)
        .op_u2(INVOKESPECIAL, init)
        .op(ARETURN);
    main.method(ACC_PUBLIC | ACC_STATIC, "run", "()Ljava/lang/Object;", Some(code));

    let vm = common::vm_with(vec![
        ("my/Shape", shape.assemble().unwrap()),
        ("my/Main", main.assemble().unwrap()),
    ]);

    let e = common::run(&vm, "my/Main", "()Ljava/lang/Object;", vec![]).unwrap_err();
    assert_eq!(e.fault(), Some(&Fault::AbstractClass("my/Shape".to_owned())));
    assert!(e.to_string().contains("class my/Shape is abstract"));

    let shape = vm.load_class("my/Shape").unwrap();
    assert!(shape.create_instance(&vm).is_err());
}
