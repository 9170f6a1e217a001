mod common;

use just_class_assembler::{
    ClassAssembler, Code, ACC_ABSTRACT, ACC_FINAL, ACC_INTERFACE, ACC_PUBLIC, ACC_STATIC,
    ACC_SUPER,
};
use just_class_file::{opcodes::*, ClassFileError};
use just_vm::{ErrorKind, Instruction, LinkError, MethodBody, ValidationError};

fn run_error(code: Code) -> ErrorKind {
    let vm = common::vm_with(vec![("my/Main", common::runner("my/Main", "()V", code))]);
    common::run(&vm, "my/Main", "()V", vec![])
        .unwrap_err()
        .into_kind()
}

#[test]
fn test_jump_into_an_instruction_fails_before_running() {
    let mut main = common::class("my/Main");
    let out = main
        .pool()
        .field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
    let text = main.pool().string("side effect");
    let println = main
        .pool()
        .method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V");
    let mut code = Code::new(2, 0);
    code.op_u2(GETSTATIC, out)
        .op_u1(LDC, text as u8)
        .op_u2(INVOKEVIRTUAL, println)
        // back by one, into the operand of invokevirtual
        .raw(&[GOTO, 0xff, 0xff])
        .op(RETURN);
    main.method(ACC_PUBLIC | ACC_STATIC, "run", "()V", Some(code));
    let vm = common::vm_with(vec![("my/Main", main.assemble().unwrap())]);
    let output = common::SharedBuffer::default();
    vm.set_output(output.clone());

    let e = common::run(&vm, "my/Main", "()V", vec![]).unwrap_err();

    assert!(matches!(
        e.kind(),
        ErrorKind::Validation(ValidationError::BadJumpTarget {
            offset: 8,
            target: 7
        })
    ));
    assert_eq!(output.contents(), "");
}

#[test]
fn test_jump_past_the_end() {
    let mut code = Code::new(0, 0);
    code.raw(&[GOTO, 0, 10]).op(RETURN);
    assert!(matches!(
        run_error(code),
        ErrorKind::Validation(ValidationError::BadJumpTarget {
            offset: 0,
            target: 10
        })
    ));
}

#[test]
fn test_local_out_of_range() {
    let mut code = Code::new(1, 1);
    code.op(ICONST_0).op(ISTORE_2).op(RETURN);
    assert!(matches!(
        run_error(code),
        ErrorKind::Validation(ValidationError::LocalOutOfRange {
            offset: 1,
            index: 2,
            max_locals: 1
        })
    ));
}

#[test]
fn test_invalid_opcode() {
    let mut code = Code::new(0, 0);
    code.op(NOP).raw(&[0xcb]);
    assert!(matches!(
        run_error(code),
        ErrorKind::Decode(ClassFileError::InvalidOpcode {
            opcode: 0xcb,
            offset: 1
        })
    ));
}

#[test]
fn test_subroutines_are_unsupported() {
    let mut code = Code::new(1, 0);
    code.raw(&[JSR, 0, 3]).op(RETURN);
    assert!(matches!(
        run_error(code),
        ErrorKind::Decode(ClassFileError::UnsupportedOpcode { offset: 0, .. })
    ));
}

fn flags_error(access_flags: u16) -> ValidationError {
    let class = ClassAssembler::new("my/Bad", Some("java/lang/Object"), access_flags);
    let vm = common::vm_with(vec![("my/Bad", class.assemble().unwrap())]);
    match vm.load_class("my/Bad").unwrap_err().into_kind() {
        ErrorKind::Validation(e) => e,
        other => panic!("expected a validation error, got {}", other),
    }
}

#[test]
fn test_illegal_class_flags() {
    let reason = |flags| match flags_error(flags) {
        ValidationError::IllegalAccessFlags { reason, .. } => reason,
        other => panic!("unexpected {}", other),
    };
    assert_eq!(reason(ACC_PUBLIC | ACC_INTERFACE), "interface must be abstract");
    assert_eq!(
        reason(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT | ACC_FINAL),
        "interface cannot be final"
    );
    assert_eq!(
        reason(ACC_PUBLIC | ACC_SUPER | ACC_ABSTRACT | ACC_FINAL),
        "class cannot be both abstract and final"
    );
}

#[test]
fn test_method_without_code() {
    let mut class = common::class("my/NoCode");
    class.method(ACC_PUBLIC | ACC_STATIC, "run", "()V", None);
    let vm = common::vm_with(vec![("my/NoCode", class.assemble().unwrap())]);

    let e = vm.load_class("my/NoCode").unwrap_err();
    assert!(matches!(
        e.kind(),
        ErrorKind::Link(LinkError::NoSuchAttribute { .. })
    ));
    assert!(e.trace().iter().any(|line| line == "loading class my/NoCode"));
}

#[test]
fn test_truncated_class_file() {
    let mut bytes = common::class("my/Cut").assemble().unwrap();
    bytes.truncate(bytes.len() / 2);
    let vm = common::vm_with(vec![("my/Cut", bytes)]);

    assert!(matches!(
        vm.load_class("my/Cut").unwrap_err().kind(),
        ErrorKind::Decode(ClassFileError::UnexpectedEof { .. })
    ));
}

#[test]
fn test_every_referenced_constant_resolves() {
    let mut class = common::class("my/Refs");
    let long = class.pool().long(1 << 40);
    let text = class.pool().string("text");
    let float = class.pool().float(1.5);
    let hash = class.pool().method_ref("java/lang/Object", "hashCode", "()I");
    let mut code = Code::new(4, 1);
    code.op_u2(LDC2_W, long)
        .op(POP2)
        .op_u1(LDC, text as u8)
        .op_u2(INVOKEVIRTUAL, hash)
        .op(POP)
        .op_u2(LDC_W, float)
        .op(POP)
        .op(RETURN);
    class.method(ACC_PUBLIC | ACC_STATIC, "run", "()V", Some(code));
    let vm = common::vm_with(vec![("my/Refs", class.assemble().unwrap())]);
    let class = vm.load_class("my/Refs").unwrap();

    for method in class.methods() {
        if let MethodBody::Bytecode(_) = method.body {
            let container = method.container(&vm).unwrap();
            assert!(container.is_validated());
        }
    }
    let run = class.get_method(&vm, "run", "()V").unwrap();
    let container = run.container(&vm).unwrap();
    let loads = container
        .instructions()
        .filter(|(_, slot)| matches!(slot.instruction, Instruction::Ldc(_)))
        .count();
    assert_eq!(loads, 3);

    common::run(&vm, "my/Refs", "()V", vec![]).unwrap();
}
