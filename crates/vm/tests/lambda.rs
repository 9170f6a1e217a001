mod common;

use just_class_assembler::{
    ClassAssembler, Code, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC, ACC_SUPER,
};
use just_class_file::opcodes::*;
use just_vm::{CallSiteKind, ErrorKind, Fault, Instruction, ValidationError, Value};

const METAFACTORY: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;\
Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";
const CONCAT_FACTORY: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;";

const REF_INVOKE_VIRTUAL: u8 = 5;
const REF_INVOKE_STATIC: u8 = 6;
const REF_NEW_INVOKE_SPECIAL: u8 = 8;

/// Add a lambda factory call site and return its constant pool index.
fn lambda_site(
    class: &mut ClassAssembler,
    (name, site_descriptor): (&str, &str),
    sam: &str,
    (kind, target_class, target_name, target_descriptor): (u8, &str, &str, &str),
) -> u16 {
    let factory = class.pool().method_ref(
        "java/lang/invoke/LambdaMetafactory",
        "metafactory",
        METAFACTORY,
    );
    let factory = class.pool().method_handle(REF_INVOKE_STATIC, factory);
    let sam_type = class.pool().method_type(sam);
    let target = class
        .pool()
        .method_ref(target_class, target_name, target_descriptor);
    let target = class.pool().method_handle(kind, target);
    let bootstrap = class.bootstrap_method(factory, vec![sam_type, target, sam_type]);
    class.pool().invoke_dynamic(bootstrap, name, site_descriptor)
}

/// `my/Lambda` whose `run(I)I` captures its argument and `digits`, then
/// applies the resulting `IntUnaryOperator` to 3.
fn digits_class(target_descriptor: &str) -> Vec<u8> {
    let mut class = common::class("my/Lambda");

    // a * 100 + b * 10 + c
    let mut body = Code::new(3, 3);
    body.op(ILOAD_0)
        .op_i1(BIPUSH, 100)
        .op(IMUL)
        .op(ILOAD_1)
        .op_i1(BIPUSH, 10)
        .op(IMUL)
        .op(IADD)
        .op(ILOAD_2)
        .op(IADD)
        .op(IRETURN);
    class.method(
        ACC_PRIVATE | ACC_STATIC,
        "lambda$run$0",
        "(III)I",
        Some(body),
    );

    let site = lambda_site(
        &mut class,
        ("applyAsInt", "(II)Ljava/util/function/IntUnaryOperator;"),
        "(I)I",
        (REF_INVOKE_STATIC, "my/Lambda", "lambda$run$0", target_descriptor),
    );
    let apply = class.pool().interface_method_ref(
        "java/util/function/IntUnaryOperator",
        "applyAsInt",
        "(I)I",
    );
    let mut run = Code::new(3, 1);
    run.op(ICONST_1)
        .op(ILOAD_0)
        .invoke_dynamic(site)
        .op(ICONST_3)
        .invoke_interface(apply, 2)
        .op(IRETURN);
    class.method(ACC_PUBLIC | ACC_STATIC, "run", "(I)I", Some(run));
    class.assemble().unwrap()
}

#[test]
fn test_lambda_captures_in_push_order() {
    let vm = common::vm_with(vec![("my/Lambda", digits_class("(III)I"))]);

    let result = common::run(&vm, "my/Lambda", "(I)I", vec![Value::Int(2)]).unwrap();
    assert_eq!(common::int(result), 123);
}

#[test]
fn test_lambda_site_is_materialized() {
    let vm = common::vm_with(vec![("my/Lambda", digits_class("(III)I"))]);
    let class = vm.load_class("my/Lambda").unwrap();
    let container = class
        .get_method(&vm, "run", "(I)I")
        .unwrap()
        .container(&vm)
        .unwrap();

    assert!(container.is_optimized());
    let site = container
        .instructions()
        .find_map(|(_, slot)| match &slot.instruction {
            Instruction::LambdaFactory(site) => Some(site.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(site.captured, 2);
    assert_eq!(site.kind, CallSiteKind::Plain);
    assert_eq!(&*site.interface, "java/util/function/IntUnaryOperator");
    assert_eq!(&*site.method_name, "applyAsInt");
    assert!(!container
        .instructions()
        .any(|(_, slot)| matches!(slot.instruction, Instruction::InvokeDynamic(_))));
}

#[test]
fn test_lambda_with_mismatched_arity() {
    // Two captured values and one interface argument cannot feed two parameters
    let mut class = common::class("my/Lambda");
    let mut body = Code::new(2, 2);
    body.op(ILOAD_0).op(ILOAD_1).op(IADD).op(IRETURN);
    class.method(ACC_PRIVATE | ACC_STATIC, "lambda$run$0", "(II)I", Some(body));
    let site = lambda_site(
        &mut class,
        ("applyAsInt", "(II)Ljava/util/function/IntUnaryOperator;"),
        "(I)I",
        (REF_INVOKE_STATIC, "my/Lambda", "lambda$run$0", "(II)I"),
    );
    let mut run = Code::new(2, 1);
    run.op(ICONST_1).op(ILOAD_0).invoke_dynamic(site).op(ARETURN);
    class.method(
        ACC_PUBLIC | ACC_STATIC,
        "run",
        "(I)Ljava/lang/Object;",
        Some(run),
    );
    let vm = common::vm_with(vec![("my/Lambda", class.assemble().unwrap())]);

    let e = common::run(&vm, "my/Lambda", "(I)Ljava/lang/Object;", vec![Value::Int(1)])
        .unwrap_err();
    assert!(matches!(
        e.kind(),
        ErrorKind::Validation(ValidationError::BadConstant(_))
    ));
}

#[test]
fn test_constructor_reference() {
    let mut boxed = common::class("my/Box");
    boxed.field(ACC_PUBLIC, "value", "I");
    let object_init = boxed.pool().method_ref("java/lang/Object", "<init>", "()V");
    let value = boxed.pool().field_ref("my/Box", "value", "I");
    let mut init = Code::new(2, 2);
    init.op(ALOAD_0)
        .op_u2(INVOKESPECIAL, object_init)
        .op(ALOAD_0)
        .op(ILOAD_1)
        .op_u2(PUTFIELD, value)
        .op(RETURN);
    boxed.method(ACC_PUBLIC, "<init>", "(I)V", Some(init));

    let mut main = common::class("my/Main");
    let site = lambda_site(
        &mut main,
        ("apply", "()Ljava/util/function/Function;"),
        "(Ljava/lang/Object;)Ljava/lang/Object;",
        (REF_NEW_INVOKE_SPECIAL, "my/Box", "<init>", "(I)V"),
    );
    let value_of = main
        .pool()
        .method_ref("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;");
    let apply = main.pool().interface_method_ref(
        "java/util/function/Function",
        "apply",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
    );
    let box_class = main.pool().class("my/Box");
    let value = main.pool().field_ref("my/Box", "value", "I");
    let mut run = Code::new(2, 0);
    run.invoke_dynamic(site)
        .op_i1(BIPUSH, 7)
        .op_u2(INVOKESTATIC, value_of)
        .invoke_interface(apply, 2)
        .op_u2(CHECKCAST, box_class)
        .op_u2(GETFIELD, value)
        .op(IRETURN);
    main.method(ACC_PUBLIC | ACC_STATIC, "run", "()I", Some(run));

    let vm = common::vm_with(vec![
        ("my/Box", boxed.assemble().unwrap()),
        ("my/Main", main.assemble().unwrap()),
    ]);
    assert_eq!(common::int(common::run(&vm, "my/Main", "()I", vec![]).unwrap()), 7);
}

/// Class whose `name()` returns `text`.
fn named(mut class: ClassAssembler, text: &str) -> Vec<u8> {
    let text = class.pool().string(text);
    let mut name = Code::new(1, 1);
    name.op_u1(LDC, text as u8).op(ARETURN);
    class.method(ACC_PUBLIC, "name", "()Ljava/lang/String;", Some(name));
    class.assemble().unwrap()
}

/// `my/Main.run(Object)` applies an `Animal::name` reference to its
/// argument.
fn method_reference_vm() -> just_vm::Vm {
    let mut main = common::class("my/Main");
    let site = lambda_site(
        &mut main,
        ("apply", "()Ljava/util/function/Function;"),
        "(Ljava/lang/Object;)Ljava/lang/Object;",
        (
            REF_INVOKE_VIRTUAL,
            "my/Animal",
            "name",
            "()Ljava/lang/String;",
        ),
    );
    let apply = main.pool().interface_method_ref(
        "java/util/function/Function",
        "apply",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
    );
    let mut run = Code::new(2, 1);
    run.invoke_dynamic(site)
        .op(ALOAD_0)
        .invoke_interface(apply, 2)
        .op(ARETURN);
    main.method(
        ACC_PUBLIC | ACC_STATIC,
        "run",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
        Some(run),
    );

    common::vm_with(vec![
        ("my/Animal", named(common::class("my/Animal"), "animal")),
        (
            "my/Dog",
            named(
                common::subclass("my/Dog", "my/Animal", ACC_PUBLIC | ACC_SUPER),
                "dog",
            ),
        ),
        ("my/Main", main.assemble().unwrap()),
    ])
}

fn apply_name(vm: &just_vm::Vm, class: &str) -> String {
    let class = vm.load_class(class).unwrap();
    class.prepare_use(vm).unwrap();
    let receiver = class.create_instance(vm).unwrap();
    let result = common::run(
        vm,
        "my/Main",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
        vec![receiver],
    );
    common::string(result.unwrap())
}

#[test]
fn test_virtual_method_reference_dispatches_on_the_receiver() {
    let vm = method_reference_vm();

    assert_eq!(apply_name(&vm, "my/Animal"), "animal");
    assert_eq!(apply_name(&vm, "my/Dog"), "dog");

    let container = vm
        .load_class("my/Main")
        .unwrap()
        .get_method(&vm, "run", "(Ljava/lang/Object;)Ljava/lang/Object;")
        .unwrap()
        .container(&vm)
        .unwrap();
    let kind = container
        .instructions()
        .find_map(|(_, slot)| match &slot.instruction {
            Instruction::LambdaFactory(site) => Some(site.kind),
            _ => None,
        });
    assert_eq!(kind, Some(CallSiteKind::AroundAbstract));
}

#[test]
fn test_virtual_method_reference_on_null() {
    let vm = method_reference_vm();

    let e = common::run(
        &vm,
        "my/Main",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
        vec![Value::Null],
    )
    .unwrap_err();
    assert!(matches!(e.fault(), Some(Fault::NullPointer(_))));
}

fn concat_class(recipe: &str) -> Vec<u8> {
    let mut class = common::class("my/Concat");
    let factory = class.pool().method_ref(
        "java/lang/invoke/StringConcatFactory",
        "makeConcatWithConstants",
        CONCAT_FACTORY,
    );
    let factory = class.pool().method_handle(REF_INVOKE_STATIC, factory);
    let recipe = class.pool().string(recipe);
    let units = class.pool().string(" units");
    let bootstrap = class.bootstrap_method(factory, vec![recipe, units]);
    let site = class.pool().invoke_dynamic(
        bootstrap,
        "makeConcatWithConstants",
        "(ILjava/lang/String;)Ljava/lang/String;",
    );
    let mut run = Code::new(2, 2);
    run.op(ILOAD_0)
        .op(ALOAD_1)
        .invoke_dynamic(site)
        .op(ARETURN);
    class.method(
        ACC_PUBLIC | ACC_STATIC,
        "run",
        "(ILjava/lang/String;)Ljava/lang/String;",
        Some(run),
    );
    class.assemble().unwrap()
}

#[test]
fn test_string_concat() {
    let vm = common::vm_with(vec![("my/Concat", concat_class("\u{1}\u{2} of \u{1}"))]);
    let name = vm.new_string("rope").unwrap();

    let result = common::run(
        &vm,
        "my/Concat",
        "(ILjava/lang/String;)Ljava/lang/String;",
        vec![Value::Int(42), name],
    )
    .unwrap();
    assert_eq!(common::string(result), "42 units of rope");
}

#[test]
fn test_string_concat_with_null() {
    let vm = common::vm_with(vec![("my/Concat", concat_class("\u{1}\u{2} of \u{1}"))]);

    let result = common::run(
        &vm,
        "my/Concat",
        "(ILjava/lang/String;)Ljava/lang/String;",
        vec![Value::Int(-1), Value::Null],
    )
    .unwrap();
    assert_eq!(common::string(result), "-1 units of null");
}

#[test]
fn test_unknown_bootstrap_method() {
    let mut class = common::class("my/Dynamic");
    let factory = class
        .pool()
        .method_ref("my/Bootstraps", "custom", METAFACTORY);
    let factory = class.pool().method_handle(REF_INVOKE_STATIC, factory);
    let bootstrap = class.bootstrap_method(factory, vec![]);
    let site = class
        .pool()
        .invoke_dynamic(bootstrap, "get", "()Ljava/lang/Object;");
    let mut run = Code::new(1, 0);
    run.invoke_dynamic(site).op(ARETURN);
    class.method(ACC_PUBLIC | ACC_STATIC, "run", "()Ljava/lang/Object;", Some(run));
    let vm = common::vm_with(vec![("my/Dynamic", class.assemble().unwrap())]);

    let e = common::run(&vm, "my/Dynamic", "()Ljava/lang/Object;", vec![]).unwrap_err();
    assert!(matches!(e.fault(), Some(Fault::Unsupported(_))));
}
