use just_class_assembler::{ClassAssembler, Code};
use just_class_file::{
    attributes::AttributeInfo, constant_pool::Constant, opcodes::*, AccessFlags, ClassFile,
    ClassFileError,
};

fn my_class_bytes() -> Vec<u8> {
    let mut class = ClassAssembler::new(
        "my/MyClass",
        Some("java/lang/Object"),
        (AccessFlags::PUBLIC | AccessFlags::SUPER).bits(),
    );
    class.interface("java/lang/Runnable");
    class.field(
        (AccessFlags::FINAL | AccessFlags::PRIVATE).bits(),
        "myField",
        "I",
    );

    let object_init = class.pool().method_ref("java/lang/Object", "<init>", "()V");
    let mut init = Code::new(1, 1);
    init.op(ALOAD_0).op_u2(INVOKESPECIAL, object_init).op(RETURN);
    class.method(AccessFlags::PUBLIC.bits(), "<init>", "()V", Some(init));

    let mut add = Code::new(2, 2);
    add.op(ILOAD_1).op(I2F).op(FRETURN);
    class.method(AccessFlags::PUBLIC.bits(), "add", "(I)F", Some(add));

    class.assemble().unwrap()
}

fn with_class_file(f: impl FnOnce(ClassFile)) {
    f(ClassFile::parse(&my_class_bytes()).unwrap());
}

#[test]
fn test_version() {
    with_class_file(|class_file| {
        assert_eq!((61, 0), (class_file.major_version, class_file.minor_version))
    });
}

#[test]
fn test_super_class() {
    with_class_file(|class_file| {
        assert_eq!(
            Some("java/lang/Object"),
            class_file.super_class().unwrap().as_deref()
        )
    });
}

#[test]
fn test_class_name() {
    with_class_file(|class_file| assert_eq!("my/MyClass", &*class_file.class_name().unwrap()));
}

#[test]
fn test_interface_names() {
    with_class_file(|class_file| {
        let interfaces = class_file.interface_names().unwrap();
        assert_eq!(vec!["java/lang/Runnable"], interfaces.iter().map(|s| &**s).collect::<Vec<_>>())
    });
}

#[test]
fn test_field_name() {
    with_class_file(|class_file| {
        assert_eq!(
            "myField",
            &*class_file.field_name(&class_file.fields[0]).unwrap()
        )
    });
}

#[test]
fn test_int_field_type() {
    with_class_file(|class_file| {
        assert_eq!(
            "I",
            &*class_file.field_descriptor(&class_file.fields[0]).unwrap()
        )
    });
}

#[test]
fn test_field_access_flags() {
    with_class_file(|class_file| {
        assert_eq!(
            AccessFlags::FINAL | AccessFlags::PRIVATE,
            class_file.fields[0].access_flags
        )
    });
}

#[test]
fn test_constructor_name() {
    with_class_file(|class_file| {
        assert_eq!(
            "<init>",
            &*class_file.method_name(&class_file.methods[0]).unwrap()
        )
    });
}

#[test]
fn test_constructor_descriptor() {
    with_class_file(|class_file| {
        assert_eq!(
            "()V",
            &*class_file
                .method_descriptor(&class_file.methods[0])
                .unwrap()
        )
    });
}

#[test]
fn test_method_name() {
    with_class_file(|class_file| {
        assert_eq!(
            "add",
            &*class_file.method_name(&class_file.methods[1]).unwrap()
        )
    });
}

#[test]
fn test_method_descriptor() {
    with_class_file(|class_file| {
        assert_eq!(
            "(I)F",
            &*class_file
                .method_descriptor(&class_file.methods[1])
                .unwrap()
        )
    });
}

#[test]
fn test_method_access_flags() {
    with_class_file(|class_file| {
        assert_eq!(AccessFlags::PUBLIC, class_file.methods[1].access_flags)
    });
}

#[test]
fn test_code_attribute() {
    with_class_file(|class_file| {
        let code = class_file.methods[1]
            .attributes
            .code_attribute(&class_file.constant_pool)
            .unwrap()
            .unwrap();
        assert_eq!((2, 2), (code.max_stack, code.max_locals));
        assert_eq!(vec![ILOAD_1, I2F, FRETURN], code.code);
    });
}

#[test]
fn test_every_method_reference_links() {
    with_class_file(|class_file| {
        let refs = class_file
            .constant_pool
            .iter()
            .filter(|(_, c)| matches!(c, Constant::MethodRef(_)))
            .count();
        assert_eq!(1, refs);
        let init = class_file
            .methods
            .iter()
            .find_map(|m| {
                m.attributes
                    .code_attribute(&class_file.constant_pool)
                    .unwrap()
            })
            .unwrap();
        let index = u16::from_be_bytes([init.code[2], init.code[3]]);
        assert_eq!(
            "java/lang/Object.<init>()V",
            class_file.constant_pool.member_ref(index).unwrap().to_string()
        );
    });
}

#[test]
fn test_constant_value_attribute() {
    let mut class = ClassAssembler::new("my/Constants", Some("java/lang/Object"), 0x21);
    let value = class.pool().integer(42);
    class
        .field(
            (AccessFlags::PUBLIC | AccessFlags::STATIC).bits(),
            "X",
            "I",
        )
        .constant_value = Some(value);
    let class_file = ClassFile::parse(&class.assemble().unwrap()).unwrap();

    let attributes = class_file.fields[0]
        .attributes
        .parse(&class_file.constant_pool)
        .unwrap();
    assert_eq!(
        vec![AttributeInfo::ConstantValue(Constant::Integer(42))],
        attributes
    );
}

#[test]
fn test_truncated_class_file() {
    let bytes = my_class_bytes();
    let result = ClassFile::parse(&bytes[..bytes.len() - 3]);
    assert!(matches!(result, Err(ClassFileError::UnexpectedEof { .. })));
}

#[test]
fn test_trailing_bytes() {
    let mut bytes = my_class_bytes();
    bytes.extend([0, 0]);
    assert!(matches!(
        ClassFile::parse(&bytes),
        Err(ClassFileError::TrailingBytes(2))
    ));
}
