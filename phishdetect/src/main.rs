use colored::Colorize;
use commands::command_argument_builder;
use phishdetect::handlers::{
    handle_batch, handle_config, handle_dom, handle_evaluate, handle_fuse, handle_visual,
    init_logging, load_config,
};
use phishdetect_core::print_banner;
use std::path::PathBuf;

mod commands;

#[tokio::main]
async fn main() {
    let chosen_command = command_argument_builder().get_matches();
    init_logging(chosen_command.get_count("verbose"));

    // Show banner unless --quiet flag is set
    if !chosen_command.get_flag("quiet") {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    let config = match load_config(chosen_command.get_one::<PathBuf>("config")) {
        Ok(config) => config,
        Err(e) => fail(e),
    };

    let outcome = match chosen_command.subcommand() {
        Some(("evaluate", primary_command)) => handle_evaluate(primary_command, config).await,
        Some(("batch", primary_command)) => handle_batch(primary_command, config).await,
        Some(("dom", primary_command)) => handle_dom(primary_command, &config),
        Some(("visual", primary_command)) => handle_visual(primary_command),
        Some(("fuse", primary_command)) => handle_fuse(primary_command, config),
        Some(("config", _)) => handle_config(&config),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        fail(e);
    }
}

fn fail(e: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "✗".red().bold(), e);
    std::process::exit(1);
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
