//! CLI subcommand implementations for the harvest binary.

pub mod agents_cmd;
pub mod output;
pub mod run_cmd;
pub mod serve;

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Honors `RUST_LOG`, defaults the
/// crate's own level from `--verbose`, and switches to JSON lines under
/// `--json`.
pub fn init_tracing() {
    let directive = if output::is_verbose() {
        "harvest_runtime=debug"
    } else {
        "harvest_runtime=info"
    };
    let filter = EnvFilter::from_default_env().add_directive(directive.parse().unwrap());

    if output::is_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(!output::is_no_color())
            .with_writer(std::io::stderr)
            .init();
    }
}
