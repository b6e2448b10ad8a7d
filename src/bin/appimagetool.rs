use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Result};
use appimagetool::appdir::validate::ToolValidator;
use appimagetool::artifact::squashfs::{Mksquashfs, SquashfsOptions};
use appimagetool::{preflight, BuildEnv, Packager, RuntimeSearchPath, Settings, ZsyncOptions};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  appimagetool [--config <file>] [--output-dir <dir>] <AppDir>\n  appimagetool --version\n  appimagetool --help\n\nEnvironment:\n  VERSION   application version (required)\n  ARCH      architecture override\n  RUST_LOG  log filter (default: info)"
}

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    appdir: Option<PathBuf>,
}

enum Command {
    Help,
    Version,
    Build(Args),
}

fn parse_args(raw: &[String]) -> Result<Command> {
    let mut args = Args::default();
    let mut rest = raw;

    loop {
        match rest {
            [] => break,
            [flag, ..] if flag == "-h" || flag == "--help" => return Ok(Command::Help),
            [flag, ..] if flag == "--version" => return Ok(Command::Version),
            [flag, value, tail @ ..] if flag == "--config" => {
                args.config = Some(PathBuf::from(value));
                rest = tail;
            }
            [flag, value, tail @ ..] if flag == "--output-dir" => {
                args.output_dir = Some(PathBuf::from(value));
                rest = tail;
            }
            [flag] if flag == "--config" || flag == "--output-dir" => {
                bail!("{} needs a value\n\n{}", flag, usage())
            }
            [flag, ..] if flag.starts_with('-') => {
                bail!("unknown option '{}'\n\n{}", flag, usage())
            }
            [appdir, tail @ ..] => {
                if args.appdir.is_some() {
                    bail!("only one AppDir may be given\n\n{}", usage());
                }
                args.appdir = Some(PathBuf::from(appdir));
                rest = tail;
            }
        }
    }

    if args.appdir.is_none() {
        bail!(usage());
    }
    Ok(Command::Build(args))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .without_time()
        .init();
}

fn build(args: Args) -> Result<()> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    preflight::check_host_tools()?;
    preflight::check_squashfs_version("mksquashfs")?;

    let env = BuildEnv::from_env();
    let runtimes = RuntimeSearchPath::from_settings(&settings.runtime);
    let image_builder = Mksquashfs::new(SquashfsOptions::from(&settings.squashfs));
    let packager = Packager {
        env: &env,
        runtimes: &runtimes,
        image_builder: &image_builder,
        validator: &ToolValidator,
        zsync: ZsyncOptions {
            block_size: settings.delta.block_size,
            url: None,
        },
    };

    let appdir = args.appdir.as_deref().unwrap_or(Path::new("."));
    let output_dir = args.output_dir.as_deref().unwrap_or(Path::new("."));
    packager.package(appdir, output_dir)?;
    Ok(())
}

fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().skip(1).collect();

    let result = match parse_args(&raw) {
        Ok(Command::Help) => {
            println!("{}", usage());
            Ok(())
        }
        Ok(Command::Version) => {
            println!("appimagetool {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Ok(Command::Build(args)) => {
            init_logging();
            build(args)
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command> {
        let raw: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        parse_args(&raw)
    }

    #[test]
    fn test_parse_build() {
        let Command::Build(args) = parse(&["--output-dir", "out", "Foo.AppDir"]).unwrap() else {
            panic!("expected build");
        };
        assert_eq!(args.appdir, Some(PathBuf::from("Foo.AppDir")));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
        assert_eq!(args.config, None);
    }

    #[test]
    fn test_parse_flags() {
        assert!(matches!(parse(&["--help"]).unwrap(), Command::Help));
        assert!(matches!(parse(&["--version"]).unwrap(), Command::Version));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["--bogus", "Foo.AppDir"]).is_err());
        assert!(parse(&["A.AppDir", "B.AppDir"]).is_err());
    }
}
