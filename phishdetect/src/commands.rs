use crate::CLAP_STYLING;
use clap::{arg, command};
use phishdetect::handlers::parse_score;
use std::path::PathBuf;
use url::Url;

fn strategy_arg() -> clap::Arg {
    arg!(--"strategy" <STRATEGY>)
        .required(false)
        .help("Fusion strategy (overrides config)")
        .value_parser(["heuristic", "classifier"])
}

fn renderer_arg() -> clap::Arg {
    arg!(--"renderer" <KIND>)
        .required(false)
        .help("Page renderer: command (headless browser script), http (static HTML), snapshot")
        .value_parser(["command", "http", "snapshot"])
}

fn snapshot_dir_arg() -> clap::Arg {
    arg!(--"snapshot-dir" <PATH>)
        .required(false)
        .help("Directory of pre-rendered <host>.json/<host>.png artifacts (implies --renderer snapshot)")
        .value_parser(clap::value_parser!(PathBuf))
}

fn url_score_arg() -> clap::Arg {
    arg!(--"url-score" <SCORE>)
        .required(false)
        .help("Use this URL score instead of querying the configured URL scoring service")
        .value_parser(parse_score)
}

fn output_arg() -> clap::Arg {
    arg!(-o --"output" <PATH>)
        .required(false)
        .help("Save report to file (default: display to screen)")
        .value_parser(clap::value_parser!(PathBuf))
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("phishdetect")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("phishdetect")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug)")
                .action(clap::ArgAction::Count)
                .global(true),
        )
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .help("Path to a TOML configuration file")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("evaluate")
                .about("Render a URL, compare it to its brand reference and decide")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to evaluate")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-b --"brand" <BRAND>)
                        .required(false)
                        .help("Brand the page claims to be (auto-detected when omitted)"),
                )
                .arg(url_score_arg())
                .arg(strategy_arg())
                .arg(renderer_arg())
                .arg(snapshot_dir_arg())
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(output_arg()),
        )
        .subcommand(
            command!("batch")
                .about("Evaluate a newline-delimited list of URLs concurrently")
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(true)
                        .help("Path to a newline-delimited file of URLs")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("Maximum number of evaluations in flight")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("4"),
                )
                .arg(url_score_arg())
                .arg(strategy_arg())
                .arg(renderer_arg())
                .arg(snapshot_dir_arg())
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, csv")
                        .value_parser(["text", "json", "csv"])
                        .default_value("text"),
                )
                .arg(output_arg()),
        )
        .subcommand(
            command!("dom")
                .about("Structural similarity of two DOM artifacts")
                .arg(
                    arg!(-a --"test" <PATH>)
                        .required(true)
                        .help("DOM JSON of the page under test")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-b --"reference" <PATH>)
                        .required(true)
                        .help("DOM JSON of the brand reference")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("visual")
                .about("Perceptual similarity of two screenshots")
                .arg(
                    arg!(-a --"test" <PATH>)
                        .required(true)
                        .help("Screenshot of the page under test")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-b --"reference" <PATH>)
                        .required(true)
                        .help("Screenshot of the brand reference")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("fuse")
                .about("Run only the fusion step on precomputed scores")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL the scores belong to")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(--"url-score" <SCORE>)
                        .required(true)
                        .help("Lexical URL score")
                        .value_parser(parse_score),
                )
                .arg(
                    arg!(--"dom-score" <SCORE>)
                        .required(false)
                        .help("DOM similarity score")
                        .value_parser(parse_score)
                        .default_value("0"),
                )
                .arg(
                    arg!(--"visual-score" <SCORE>)
                        .required(false)
                        .help("Visual similarity score")
                        .value_parser(parse_score)
                        .default_value("0"),
                )
                .arg(arg!(-b --"brand" <BRAND>).required(false).help("Brand identity"))
                .arg(strategy_arg())
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(command!("config").about("Print the effective configuration as TOML"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_definition_is_valid() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_evaluate_args() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "phishdetect",
                "-vv",
                "evaluate",
                "-u",
                "https://paypa1.com",
                "--url-score",
                "0.3",
                "--strategy",
                "classifier",
            ])
            .unwrap();
        assert_eq!(matches.get_count("verbose"), 2);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "evaluate");
        assert_eq!(sub.get_one::<f64>("url-score"), Some(&0.3));
        assert_eq!(sub.get_one::<String>("format").map(String::as_str), Some("text"));
    }

    #[test]
    fn test_score_out_of_range_is_rejected() {
        let result = command_argument_builder().try_get_matches_from([
            "phishdetect",
            "fuse",
            "-u",
            "https://example.org",
            "--url-score",
            "1.2",
        ]);
        assert!(result.is_err());
    }
}
