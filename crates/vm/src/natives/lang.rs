use super::{arg, int_arg, long_arg, str_arg, to_java_string, NativeClass, NativeRegistry};
use crate::{
    error::Fault,
    value::{NativePayload, Value},
    vm::Vm,
    Result,
};

pub(super) fn register(registry: &mut NativeRegistry) {
    registry.register(object());
    registry.register(class());
    registry.register(string());
    registry.register(string_builder());
    registry.register(
        NativeClass::new("java/lang/Number")
            .method("<init>", "()V", |_, _| Ok(None))
            .abstract_class(),
    );
    registry.register(integer());
    registry.register(long());
    registry.register(math());
    registry.register(throwable());
    for (name, parent) in [
        ("java/lang/Exception", "java/lang/Throwable"),
        ("java/lang/Error", "java/lang/Throwable"),
        ("java/lang/RuntimeException", "java/lang/Exception"),
        ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
        ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
        ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    ] {
        registry.register(NativeClass::new(name).extends(parent));
    }
    for name in [
        "java/lang/Runnable",
        "java/lang/Comparable",
        "java/lang/CharSequence",
        "java/util/function/Function",
        "java/util/function/BiFunction",
        "java/util/function/Supplier",
        "java/util/function/Consumer",
        "java/util/function/Predicate",
        "java/util/function/IntBinaryOperator",
        "java/util/function/IntUnaryOperator",
    ] {
        registry.register(NativeClass::new(name).interface());
    }
}

fn object() -> NativeClass {
    NativeClass::new("java/lang/Object")
        .method("<init>", "()V", |_, _| Ok(None))
        .method("hashCode", "()I", |_, args| {
            Ok(Some(Value::Int(arg(args, 0)?.identity_hash())))
        })
        .method("equals", "(Ljava/lang/Object;)Z", |_, args| {
            Ok(Some(arg(args, 0)?.same_reference(arg(args, 1)?).into()))
        })
        .method("toString", "()Ljava/lang/String;", |vm, args| {
            let this = arg(args, 0)?;
            let s = format!(
                "{}@{:x}",
                this.type_name().replace('/', "."),
                this.identity_hash()
            );
            Ok(Some(vm.new_string(&s)?))
        })
        .method("getClass", "()Ljava/lang/Class;", |vm, args| {
            let name = vm.class_of(arg(args, 0)?)?.name.clone();
            Ok(Some(vm.class_literal(&name)?))
        })
}

fn class() -> NativeClass {
    NativeClass::new("java/lang/Class").method("getName", "()Ljava/lang/String;", |vm, args| {
        let this = arg(args, 0)?;
        let name = match this {
            Value::Native(n) => match &*n.payload() {
                NativePayload::ClassLiteral(name) => name.replace('/', "."),
                _ => this.type_name(),
            },
            other => other.type_name(),
        };
        Ok(Some(vm.new_string(&name)?))
    })
}

fn utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn string() -> NativeClass {
    NativeClass::new("java/lang/String")
        .implements("java/lang/CharSequence")
        .implements("java/lang/Comparable")
        .method("length", "()I", |_, args| {
            Ok(Some(Value::Int(utf16(&str_arg(args, 0)?).len() as i32)))
        })
        .method("isEmpty", "()Z", |_, args| {
            Ok(Some(str_arg(args, 0)?.is_empty().into()))
        })
        .method("charAt", "(I)C", |_, args| {
            let units = utf16(&str_arg(args, 0)?);
            let index = int_arg(args, 1)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| units.get(i))
                .map(|c| Some(Value::Int(*c as i32)))
                .ok_or_else(|| {
                    Fault::ArrayIndexOutOfBounds {
                        index,
                        length: units.len(),
                    }
                    .into()
                })
        })
        .method("equals", "(Ljava/lang/Object;)Z", |_, args| {
            let this = str_arg(args, 0)?;
            Ok(Some(
                (arg(args, 1)?.as_str().as_deref() == Some(&*this)).into(),
            ))
        })
        .method("hashCode", "()I", |_, args| {
            let hash = utf16(&str_arg(args, 0)?)
                .iter()
                .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(*c as i32));
            Ok(Some(Value::Int(hash)))
        })
        .method("compareTo", "(Ljava/lang/String;)I", |_, args| {
            let (a, b) = (utf16(&str_arg(args, 0)?), utf16(&str_arg(args, 1)?));
            let ordering = a
                .iter()
                .zip(&b)
                .find(|(x, y)| x != y)
                .map(|(x, y)| *x as i32 - *y as i32)
                .unwrap_or(a.len() as i32 - b.len() as i32);
            Ok(Some(Value::Int(ordering)))
        })
        .method("concat", "(Ljava/lang/String;)Ljava/lang/String;", |vm, args| {
            let s = format!("{}{}", str_arg(args, 0)?, str_arg(args, 1)?);
            Ok(Some(vm.new_string(&s)?))
        })
        .method("toString", "()Ljava/lang/String;", |_, args| {
            Ok(Some(arg(args, 0)?.clone()))
        })
        .method("intern", "()Ljava/lang/String;", |vm, args| {
            Ok(Some(vm.intern(&str_arg(args, 0)?)?))
        })
        .static_method("valueOf", "(I)Ljava/lang/String;", |vm, args| value_of(vm, args, "I"))
        .static_method("valueOf", "(J)Ljava/lang/String;", |vm, args| value_of(vm, args, "J"))
        .static_method("valueOf", "(Z)Ljava/lang/String;", |vm, args| value_of(vm, args, "Z"))
        .static_method("valueOf", "(C)Ljava/lang/String;", |vm, args| value_of(vm, args, "C"))
        .static_method("valueOf", "(F)Ljava/lang/String;", |vm, args| value_of(vm, args, "F"))
        .static_method("valueOf", "(D)Ljava/lang/String;", |vm, args| value_of(vm, args, "D"))
        .static_method(
            "valueOf",
            "(Ljava/lang/Object;)Ljava/lang/String;",
            |vm, args| value_of(vm, args, "Ljava/lang/Object;"),
        )
}

fn value_of(vm: &Vm, args: &[Value], descriptor: &str) -> Result<Option<Value>> {
    let s = to_java_string(vm, arg(args, 0)?, Some(descriptor))?;
    Ok(Some(vm.new_string(&s)?))
}

fn string_builder() -> NativeClass {
    let mut class = NativeClass::new("java/lang/StringBuilder")
        .implements("java/lang/CharSequence")
        .method("<init>", "()V", |_, args| {
            set_builder(arg(args, 0)?, String::new())?;
            Ok(None)
        })
        .method("<init>", "(Ljava/lang/String;)V", |_, args| {
            set_builder(arg(args, 0)?, str_arg(args, 1)?.to_string())?;
            Ok(None)
        })
        .method("toString", "()Ljava/lang/String;", |vm, args| {
            let s = builder_contents(arg(args, 0)?)?;
            Ok(Some(vm.new_string(&s)?))
        })
        .method("length", "()I", |_, args| {
            Ok(Some(Value::Int(
                builder_contents(arg(args, 0)?)?.encode_utf16().count() as i32,
            )))
        });

    for parameter in ["Ljava/lang/String;", "Ljava/lang/Object;", "I", "J", "C", "Z", "F", "D"] {
        let descriptor = format!("({})Ljava/lang/StringBuilder;", parameter);
        class = class.method("append", &descriptor, move |vm, args| {
            let this = arg(args, 0)?;
            let text = to_java_string(vm, arg(args, 1)?, Some(parameter))?;
            let mut contents = builder_contents(this)?;
            contents.push_str(&text);
            set_builder(this, contents)?;
            Ok(Some(this.clone()))
        });
    }
    class
}

fn builder_contents(value: &Value) -> Result<String> {
    match value {
        Value::Native(n) => match &*n.payload() {
            NativePayload::Builder(s) => Ok(s.clone()),
            _ => Ok(String::new()),
        },
        Value::Null => Err(Fault::NullPointer("StringBuilder is null".to_owned()).into()),
        other => Err(Fault::TypeMismatch {
            expected: "java/lang/StringBuilder",
            found: other.type_name(),
        }
        .into()),
    }
}

fn set_builder(value: &Value, contents: String) -> Result<()> {
    match value {
        Value::Native(n) => {
            *n.payload_mut() = NativePayload::Builder(contents);
            Ok(())
        }
        other => Err(Fault::TypeMismatch {
            expected: "java/lang/StringBuilder",
            found: other.type_name(),
        }
        .into()),
    }
}

fn integer() -> NativeClass {
    NativeClass::new("java/lang/Integer")
        .extends("java/lang/Number")
        .implements("java/lang/Comparable")
        .static_field("MAX_VALUE", "I", |_| Ok(Value::Int(i32::MAX)))
        .static_field("MIN_VALUE", "I", |_| Ok(Value::Int(i32::MIN)))
        .static_method("valueOf", "(I)Ljava/lang/Integer;", |_, args| {
            Ok(Some(Value::Int(int_arg(args, 0)?)))
        })
        .static_method("parseInt", "(Ljava/lang/String;)I", |_, args| {
            let s = str_arg(args, 0)?;
            let i = s
                .trim()
                .parse::<i32>()
                .map_err(|_| Fault::NumberFormat(s.to_string()))?;
            Ok(Some(Value::Int(i)))
        })
        .static_method("toString", "(I)Ljava/lang/String;", |vm, args| {
            Ok(Some(vm.new_string(&int_arg(args, 0)?.to_string())?))
        })
        .method("intValue", "()I", |_, args| Ok(Some(Value::Int(int_arg(args, 0)?))))
        .method("hashCode", "()I", |_, args| Ok(Some(Value::Int(int_arg(args, 0)?))))
        .method("equals", "(Ljava/lang/Object;)Z", |_, args| {
            Ok(Some(arg(args, 0)?.same_reference(arg(args, 1)?).into()))
        })
        .method("toString", "()Ljava/lang/String;", |vm, args| {
            Ok(Some(vm.new_string(&int_arg(args, 0)?.to_string())?))
        })
}

fn long() -> NativeClass {
    NativeClass::new("java/lang/Long")
        .extends("java/lang/Number")
        .implements("java/lang/Comparable")
        .static_field("MAX_VALUE", "J", |_| Ok(Value::Long(i64::MAX)))
        .static_field("MIN_VALUE", "J", |_| Ok(Value::Long(i64::MIN)))
        .static_method("valueOf", "(J)Ljava/lang/Long;", |_, args| {
            Ok(Some(Value::Long(long_arg(args, 0)?)))
        })
        .static_method("parseLong", "(Ljava/lang/String;)J", |_, args| {
            let s = str_arg(args, 0)?;
            let l = s
                .trim()
                .parse::<i64>()
                .map_err(|_| Fault::NumberFormat(s.to_string()))?;
            Ok(Some(Value::Long(l)))
        })
        .static_method("toString", "(J)Ljava/lang/String;", |vm, args| {
            Ok(Some(vm.new_string(&long_arg(args, 0)?.to_string())?))
        })
        .method("longValue", "()J", |_, args| Ok(Some(Value::Long(long_arg(args, 0)?))))
        .method("equals", "(Ljava/lang/Object;)Z", |_, args| {
            Ok(Some(arg(args, 0)?.same_reference(arg(args, 1)?).into()))
        })
        .method("toString", "()Ljava/lang/String;", |vm, args| {
            Ok(Some(vm.new_string(&long_arg(args, 0)?.to_string())?))
        })
}

fn math() -> NativeClass {
    NativeClass::new("java/lang/Math")
        .static_method("max", "(II)I", |_, args| {
            Ok(Some(Value::Int(int_arg(args, 0)?.max(int_arg(args, 1)?))))
        })
        .static_method("min", "(II)I", |_, args| {
            Ok(Some(Value::Int(int_arg(args, 0)?.min(int_arg(args, 1)?))))
        })
        .static_method("abs", "(I)I", |_, args| {
            Ok(Some(Value::Int(int_arg(args, 0)?.wrapping_abs())))
        })
        .static_method("max", "(JJ)J", |_, args| {
            Ok(Some(Value::Long(long_arg(args, 0)?.max(long_arg(args, 1)?))))
        })
        .static_method("sqrt", "(D)D", |_, args| {
            Ok(Some(Value::Double(arg(args, 0)?.as_double()?.sqrt())))
        })
}

fn throwable() -> NativeClass {
    NativeClass::new("java/lang/Throwable")
        .field("detailMessage", "Ljava/lang/String;")
        .method("<init>", "()V", |_, _| Ok(None))
        .method("<init>", "(Ljava/lang/String;)V", |_, args| {
            set_message(arg(args, 0)?, arg(args, 1)?.clone())?;
            Ok(None)
        })
        .method("getMessage", "()Ljava/lang/String;", |_, args| {
            Ok(Some(message(arg(args, 0)?)))
        })
        .method("toString", "()Ljava/lang/String;", |vm, args| {
            let this = arg(args, 0)?;
            let name = this.type_name().replace('/', ".");
            let s = match message(this).as_str() {
                Some(message) => format!("{}: {}", name, message),
                None => name,
            };
            Ok(Some(vm.new_string(&s)?))
        })
}

fn message(value: &Value) -> Value {
    let message = match value {
        Value::Object(o) => o.get_field("detailMessage"),
        Value::Native(n) => n.get_field("detailMessage"),
        _ => None,
    };
    message.unwrap_or(Value::Null)
}

fn set_message(value: &Value, message: Value) -> Result<()> {
    match value {
        Value::Object(o) => {
            if !o.set_field("detailMessage", message) {
                return Err(Fault::NoSuchField("detailMessage".to_owned()).into());
            }
        }
        Value::Native(n) => n.set_field("detailMessage", message),
        other => {
            return Err(Fault::TypeMismatch {
                expected: "java/lang/Throwable",
                found: other.type_name(),
            }
            .into())
        }
    }
    Ok(())
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    #[test]
    fn it_should_register_overloads_separately() {
        let registry = NativeRegistry::with_builtins();
        let class = registry.get("java/lang/StringBuilder").unwrap();
        assert!(class
            .find_method("append", "(I)Ljava/lang/StringBuilder;")
            .is_some());
        assert!(class
            .find_method("append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
            .is_some());
        assert!(class.find_method("append", "(S)Ljava/lang/StringBuilder;").is_none());
    }

    #[test]
    fn it_should_chain_exceptions_to_throwable() {
        let registry = NativeRegistry::with_builtins();
        let runtime_exception = registry.get("java/lang/RuntimeException").unwrap();
        assert_eq!(runtime_exception.parent.as_deref(), Some("java/lang/Exception"));
        assert!(registry.contains("java/lang/Throwable"));
    }
}
