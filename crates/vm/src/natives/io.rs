use super::{arg, int_arg, to_java_string, NativeClass, NativeRegistry};
use crate::{
    error::Fault,
    value::{NativePayload, Stream, Value},
    vm::Vm,
    Result,
};

pub(super) fn register(registry: &mut NativeRegistry) {
    registry.register(system());
    registry.register(print_stream());
}

fn system() -> NativeClass {
    NativeClass::new("java/lang/System")
        .static_field("out", "Ljava/io/PrintStream;", |vm| {
            vm.new_native("java/io/PrintStream", NativePayload::PrintStream(Stream::Out))
        })
        .static_field("err", "Ljava/io/PrintStream;", |vm| {
            vm.new_native("java/io/PrintStream", NativePayload::PrintStream(Stream::Err))
        })
        .static_method("identityHashCode", "(Ljava/lang/Object;)I", |_, args| {
            Ok(Some(Value::Int(arg(args, 0)?.identity_hash())))
        })
        .static_method(
            "arraycopy",
            "(Ljava/lang/Object;ILjava/lang/Object;II)V",
            |_, args| {
                let source = arg(args, 0)?.as_array()?;
                let source_position = int_arg(args, 1)?;
                let destination = arg(args, 2)?.as_array()?;
                let destination_position = int_arg(args, 3)?;
                let length = int_arg(args, 4)?;
                if length < 0 {
                    return Err(Fault::ArrayIndexOutOfBounds {
                        index: length,
                        length: source.len(),
                    }
                    .into());
                }
                // Copy through a buffer so overlapping ranges of one array work
                let buffer = (0..length)
                    .map(|i| source.get(source_position + i))
                    .collect::<Result<Vec<_>, _>>()?;
                for (i, value) in buffer.into_iter().enumerate() {
                    destination.set(destination_position + i as i32, value)?;
                }
                Ok(None)
            },
        )
}

fn print_stream() -> NativeClass {
    let mut class = NativeClass::new("java/io/PrintStream")
        .method("println", "()V", |vm, args| print(vm, arg(args, 0)?, "\n"));

    for parameter in [
        "Ljava/lang/String;",
        "Ljava/lang/Object;",
        "I",
        "J",
        "C",
        "Z",
        "F",
        "D",
    ] {
        class = class
            .method("print", &format!("({})V", parameter), move |vm, args| {
                let text = to_java_string(vm, arg(args, 1)?, Some(parameter))?;
                print(vm, arg(args, 0)?, &text)
            })
            .method("println", &format!("({})V", parameter), move |vm, args| {
                let mut text = to_java_string(vm, arg(args, 1)?, Some(parameter))?;
                text.push('\n');
                print(vm, arg(args, 0)?, &text)
            });
    }
    class
}

fn print(vm: &Vm, stream: &Value, text: &str) -> Result<Option<Value>> {
    let stream = match stream {
        Value::Native(n) => match &*n.payload() {
            NativePayload::PrintStream(stream) => *stream,
            _ => Stream::Out,
        },
        Value::Null => return Err(Fault::NullPointer("PrintStream is null".to_owned()).into()),
        _ => Stream::Out,
    };
    vm.write_output(stream, text)?;
    Ok(None)
}
