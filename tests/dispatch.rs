use nodectl::{cli, dispatch::available_cpus, start, CommandRegistry, Dispatched, ParsedArgs};

fn workers() -> CommandRegistry<Option<usize>> {
    let mut registry = CommandRegistry::new();
    registry.register("start", |args: ParsedArgs| Ok(args.multiprocess.workers()));
    registry
}

#[test]
fn start_defaults_to_one_worker() {
    let got = start(&cli::parser(), ["start"], &workers()).unwrap();
    assert_eq!(got, Dispatched::Completed(Some(1)));
}

#[test]
fn bare_multiprocess_uses_every_core() {
    let got = start(&cli::parser(), ["start", "--multiprocess"], &workers()).unwrap();
    assert_eq!(got, Dispatched::Completed(Some(available_cpus())));
}

#[test]
fn explicit_worker_count_is_kept() {
    let got = start(&cli::parser(), ["start", "--multiprocess", "5"], &workers()).unwrap();
    assert_eq!(got, Dispatched::Completed(Some(5)));
}

#[test]
fn registered_parser_command_without_handler_is_not_implemented() {
    let err = start(&cli::parser(), ["show-config"], &workers()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<nodectl::CommandError>(),
        Some(nodectl::CommandError::NotImplemented(name)) if name == "show-config"
    ));
}
