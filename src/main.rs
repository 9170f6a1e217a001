use std::{process, thread};

use clap::{App, AppSettings, Arg, ArgMatches};
use just_vm::{DirectorySource, Vm, VmOptions};
use log::{debug, error};

struct Invocation {
    options: VmOptions,
    class_dir: String,
    main_class: String,
    args: Vec<String>,
}

fn app() -> App<'static, 'static> {
    App::new("just")
        .version("0.1.0")
        .about("Loads class files from a directory and runs a main method")
        .setting(AppSettings::TrailingVarArg)
        .arg(
            Arg::with_name("no static init")
                .long("no-static-init")
                .help("Skips <clinit> methods of loaded classes"),
        )
        .arg(
            Arg::with_name("max depth")
                .long("max-depth")
                .value_name("N")
                .takes_value(true)
                .help("Deepest allowed nesting of calls"),
        )
        .arg(
            Arg::with_name("CLASS_DIR")
                .help("Directory holding the class files")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("MAIN_CLASS")
                .help("Class whose main method runs, eg. my.Main")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::with_name("ARGS")
                .help("Arguments passed to main")
                .multiple(true)
                .allow_hyphen_values(true)
                .index(3),
        )
}

fn invocation(matches: &ArgMatches) -> Result<Invocation, String> {
    let mut options = VmOptions::default();
    options.run_static_init = !matches.is_present("no static init");
    if let Some(depth) = matches.value_of("max depth") {
        options.max_call_depth = depth
            .parse()
            .map_err(|_| format!("invalid depth {:?}", depth))?;
    }

    Ok(Invocation {
        options,
        class_dir: matches.value_of("CLASS_DIR").unwrap_or_default().to_owned(),
        main_class: matches.value_of("MAIN_CLASS").unwrap_or_default().to_owned(),
        args: matches
            .values_of("ARGS")
            .map(|values| values.map(str::to_owned).collect())
            .unwrap_or_default(),
    })
}

fn main() {
    pretty_env_logger::init();

    let invocation = match invocation(&app().get_matches()) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(2);
        }
    };

    debug!(
        "running {} from {} with {:?}",
        invocation.main_class, invocation.class_dir, invocation.options
    );
    let stack_size = stack_size(invocation.options.max_call_depth);
    let runner = thread::Builder::new()
        .name("interpreter".into())
        .stack_size(stack_size)
        .spawn(move || run(invocation));
    let code = match runner.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => 101,
        Err(e) => {
            eprintln!("cannot start the interpreter thread: {}", e);
            1
        }
    };
    process::exit(code);
}

/// Host stack for an interpreter allowed `max_depth` nested calls.
fn stack_size(max_depth: usize) -> usize {
    max_depth.saturating_mul(64 << 10).saturating_add(1 << 20)
}

fn run(invocation: Invocation) -> i32 {
    let vm = Vm::with_options(
        DirectorySource::new(&invocation.class_dir),
        invocation.options,
    );
    match vm.run_main(&invocation.main_class, &invocation.args) {
        Ok(()) => 0,
        Err(e) => {
            error!("{} failed", invocation.main_class);
            eprintln!("{}", e);
            1
        }
    }
}

#[cfg(test)]
mod parse_args_tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation, String> {
        let args = std::iter::once("just").chain(args.iter().copied());
        let matches = app().get_matches_from_safe(args).map_err(|e| e.message)?;
        invocation(&matches)
    }

    #[test]
    fn it_should_pass_trailing_arguments_to_the_program() {
        let invocation = parse(&["classes", "my.Main", "first", "second"]).unwrap();

        assert_eq!(invocation.class_dir, "classes");
        assert_eq!(invocation.main_class, "my.Main");
        assert_eq!(invocation.args, vec!["first", "second"]);
        assert_eq!(invocation.options.max_call_depth, 64);
    }

    #[test]
    fn it_should_read_options() {
        let invocation =
            parse(&["--no-static-init", "--max-depth", "8", "classes", "Main"]).unwrap();

        assert!(!invocation.options.run_static_init);
        assert_eq!(invocation.options.max_call_depth, 8);
        assert!(invocation.args.is_empty());
    }

    #[test]
    fn it_should_reject_bad_invocations() {
        assert!(parse(&["classes"]).is_err());
        assert!(parse(&["--max-depth", "deep", "classes", "Main"]).is_err());
        assert!(parse(&["--verbose", "classes", "Main"]).is_err());
    }

    #[test]
    fn it_should_size_the_stack_from_the_depth() {
        assert_eq!(stack_size(0), 1 << 20);
        assert!(stack_size(1024) > stack_size(64));
        assert_eq!(stack_size(usize::MAX), usize::MAX);
    }
}
