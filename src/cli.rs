//! Command-line argument handling, gzip-flavored.
//!
//! razgz is decompression-only: the familiar gzip flags are accepted where
//! they make sense, plus `-t` (threads), `-s` (skip compressed bytes before
//! decoding) and `-u` (stop shortly after a compressed position).

use std::env;

use crate::error::{RazgzError, RazgzResult};

#[derive(Debug, Clone)]
pub struct RazgzArgs {
    pub files: Vec<String>,
    pub decompress: bool,
    pub stdout: bool,
    pub threads: usize,
    pub skip: Option<usize>,
    pub until: Option<usize>,
    pub keep: bool,
    pub force: bool,
    /// Accepted for gzip compatibility; stored names are never restored.
    #[allow(dead_code)]
    pub no_name: bool,
    pub quiet: bool,
    pub verbosity: u8,
    pub suffix: String,
    pub help: bool,
    pub version: bool,
}

impl Default for RazgzArgs {
    fn default() -> Self {
        RazgzArgs {
            files: Vec::new(),
            decompress: false,
            stdout: false,
            threads: num_cpus::get().max(1),
            skip: None,
            until: None,
            keep: false,
            force: false,
            no_name: false,
            quiet: false,
            verbosity: 1,
            suffix: ".gz".to_string(),
            help: false,
            version: false,
        }
    }
}

impl RazgzArgs {
    pub fn parse() -> RazgzResult<Self> {
        Self::parse_from(env::args().skip(1).collect())
    }

    pub fn parse_from(argv: Vec<String>) -> RazgzResult<Self> {
        let mut args = RazgzArgs::default();
        let mut i = 0;
        let mut in_options = true;

        while i < argv.len() {
            let arg = &argv[i];

            if !in_options || !arg.starts_with('-') || arg == "-" {
                args.files.push(arg.clone());
                i += 1;
                continue;
            }

            if arg == "--" {
                in_options = false;
                i += 1;
                continue;
            }

            if let Some(long) = arg.strip_prefix("--") {
                match long {
                    "help" => args.help = true,
                    "version" => args.version = true,
                    "decompress" | "uncompress" => args.decompress = true,
                    "stdout" | "to-stdout" => args.stdout = true,
                    "keep" => args.keep = true,
                    "force" => args.force = true,
                    "no-name" => args.no_name = true,
                    "quiet" | "silent" => {
                        args.quiet = true;
                        args.verbosity = 0;
                    }
                    "verbose" => args.verbosity = args.verbosity.saturating_add(1),
                    _ => {
                        if let Some(value) = long.strip_prefix("threads=") {
                            args.threads = parse_count(value, "threads")?;
                        } else if let Some(value) = long.strip_prefix("skip=") {
                            args.skip = Some(parse_count(value, "skip")?);
                        } else if let Some(value) = long.strip_prefix("until=") {
                            args.until = Some(parse_count(value, "until")?);
                        } else if let Some(value) = long.strip_prefix("suffix=") {
                            args.suffix = validated_suffix(value)?;
                        } else {
                            return Err(RazgzError::invalid_argument(format!(
                                "unknown option: {}",
                                arg
                            )));
                        }
                    }
                }
                i += 1;
                continue;
            }

            // Bundled short options; -t/-s/-u/-S take a value, attached or
            // as the next argument.
            let chars: Vec<char> = arg.chars().collect();
            let mut j = 1;
            while j < chars.len() {
                let opt = chars[j];
                match opt {
                    'h' => args.help = true,
                    'V' => args.version = true,
                    'd' => args.decompress = true,
                    'c' => args.stdout = true,
                    'k' => args.keep = true,
                    'f' => args.force = true,
                    'n' => args.no_name = true,
                    'q' => {
                        args.quiet = true;
                        args.verbosity = 0;
                    }
                    'v' => args.verbosity = args.verbosity.saturating_add(1),
                    't' | 's' | 'u' | 'S' => {
                        let attached: String = chars[j + 1..].iter().collect();
                        let value = if !attached.is_empty() {
                            attached
                        } else {
                            i += 1;
                            argv.get(i)
                                .ok_or_else(|| {
                                    RazgzError::invalid_argument(format!(
                                        "-{} requires an argument",
                                        opt
                                    ))
                                })?
                                .clone()
                        };
                        match opt {
                            't' => args.threads = parse_count(&value, "threads")?,
                            's' => args.skip = Some(parse_count(&value, "skip")?),
                            'u' => args.until = Some(parse_count(&value, "until")?),
                            'S' => args.suffix = validated_suffix(&value)?,
                            _ => unreachable!(),
                        }
                        j = chars.len();
                        continue;
                    }
                    _ => {
                        return Err(RazgzError::invalid_argument(format!(
                            "unknown option: -{}",
                            opt
                        )));
                    }
                }
                j += 1;
            }
            i += 1;
        }

        if args.threads == 0 {
            return Err(RazgzError::invalid_argument("thread count must be positive"));
        }
        Ok(args)
    }
}

fn parse_count(value: &str, what: &str) -> RazgzResult<usize> {
    value
        .parse::<usize>()
        .map_err(|_| RazgzError::invalid_argument(format!("invalid {}: {}", what, value)))
}

fn validated_suffix(value: &str) -> RazgzResult<String> {
    if value.is_empty() {
        return Err(RazgzError::invalid_argument("suffix must not be empty"));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RazgzArgs {
        RazgzArgs::parse_from(args.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn parses_typical_invocation() {
        let args = parse(&["-dc", "-t", "8", "reads.fastq.gz"]);
        assert!(args.decompress);
        assert!(args.stdout);
        assert_eq!(args.threads, 8);
        assert_eq!(args.files, vec!["reads.fastq.gz"]);
    }

    #[test]
    fn parses_attached_values_and_long_forms() {
        let args = parse(&["-t4", "-s1048576", "--until=2097152", "-S", ".gzip"]);
        assert_eq!(args.threads, 4);
        assert_eq!(args.skip, Some(1048576));
        assert_eq!(args.until, Some(2097152));
        assert_eq!(args.suffix, ".gzip");
    }

    #[test]
    fn stdin_dash_is_a_file() {
        let args = parse(&["-d", "-"]);
        assert_eq!(args.files, vec!["-"]);
    }

    #[test]
    fn quiet_and_verbose_adjust_verbosity() {
        assert_eq!(parse(&["-q"]).verbosity, 0);
        assert_eq!(parse(&["-v"]).verbosity, 2);
        assert_eq!(parse(&["-vv"]).verbosity, 3);
    }

    #[test]
    fn rejects_unknown_and_invalid() {
        assert!(RazgzArgs::parse_from(vec!["-x".into()]).is_err());
        assert!(RazgzArgs::parse_from(vec!["-t".into(), "many".into()]).is_err());
        assert!(RazgzArgs::parse_from(vec!["-t0".into()]).is_err());
        assert!(RazgzArgs::parse_from(vec!["-S".into(), "".into()]).is_err());
    }

    #[test]
    fn double_dash_stops_option_parsing() {
        let args = parse(&["-d", "--", "-weird.gz"]);
        assert_eq!(args.files, vec!["-weird.gz"]);
    }
}
