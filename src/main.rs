//! KI-Browser Spoof - Developer CLI
//!
//! Generates the scripts the hosting engine would inject, dumps per-context
//! seeds and runs shaders through the translator, so each piece can be
//! inspected without a browser.

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ki_browser_spoof::{
    config::{CliArgs, SpoofSettings},
    profile::{TargetOs, VmProfile},
    seeds::{HashKind, SeedRegistry},
    shader::{validate_shader, ShaderStage},
    stealth::{ExecutionContextType, SpoofManager},
    NAME, VERSION,
};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
}

const CONTEXT_TYPES: [&str; 7] = [
    "main_frame",
    "iframe",
    "dedicated_worker",
    "shared_worker",
    "service_worker",
    "audio_worklet",
    "paint_worklet",
];

fn profile_args() -> [Arg; 3] {
    [
        Arg::new("profile")
            .long("profile")
            .value_name("FILE")
            .help("VM profile file (TOML or JSON)")
            .value_parser(clap::value_parser!(PathBuf)),
        Arg::new("seed")
            .long("seed")
            .value_name("STRING")
            .help("Derive a reproducible profile from a seed string")
            .conflicts_with("profile"),
        Arg::new("context")
            .long("context")
            .value_name("ID")
            .help("Context string id (default: a random UUID)"),
    ]
}

/// Build the CLI command parser
fn build_cli() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author("KI-Browser Team")
        .about("Inspect the fingerprint spoofing core")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file (TOML or JSON)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("host-os")
                .long("host-os")
                .value_name("OS")
                .global(true)
                .help("Host OS for font exclusion: windows, macos or linux"),
        )
        .arg(
            Arg::new("host-dpr")
                .long("host-dpr")
                .value_name("RATIO")
                .global(true)
                .help("Device pixel ratio of the real display")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("no-workers")
                .long("no-workers")
                .global(true)
                .help("Leave the worker interceptor out of injection bundles")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-iframes")
                .long("no-iframes")
                .global(true)
                .help("Leave the iframe interceptor out of injection bundles")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-blobs")
                .long("no-blobs")
                .global(true)
                .help("Leave the Blob URL interceptors out of injection bundles")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("worker-fallback")
                .long("worker-fallback")
                .value_name("MODE")
                .global(true)
                .help("Workers without a profile: random_profile or unpatched")
                .value_parser(["random_profile", "unpatched"]),
        )
        .arg(
            Arg::new("shader-noise")
                .long("shader-noise")
                .global(true)
                .help("Blend seeded noise into fragment shader output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("shader-banner")
                .long("shader-banner")
                .global(true)
                .help("Prefix translated shaders with a debug banner")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .help("Enable verbose logging")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .help("Suppress output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .subcommand(
            Command::new("frame")
                .about("Print the frame script or the full injection bundle")
                .args(profile_args())
                .arg(
                    Arg::new("iframe")
                        .long("iframe")
                        .help("Generate for a child frame")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("bundle")
                        .long("bundle")
                        .help("Include the early Blob and nested context interceptors")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("worker")
                .about("Print the script for a worker or worklet realm")
                .args(profile_args())
                .arg(
                    Arg::new("type")
                        .long("type")
                        .value_name("TYPE")
                        .default_value("dedicated_worker")
                        .value_parser(CONTEXT_TYPES),
                ),
        )
        .subcommand(
            Command::new("interceptors")
                .about("Print one interceptor script")
                .args(profile_args())
                .arg(
                    Arg::new("kind")
                        .value_name("KIND")
                        .required(true)
                        .value_parser(["worker", "iframe", "blob", "early-blob", "es-module"]),
                ),
        )
        .subcommand(Command::new("detector").about("Print the context detector expression"))
        .subcommand(
            Command::new("seeds")
                .about("Print the seed bundle registered for a context")
                .args(profile_args()),
        )
        .subcommand(
            Command::new("fonts")
                .about("Show the font identity for a target OS")
                .args(profile_args())
                .arg(
                    Arg::new("target")
                        .long("target")
                        .value_name("OS")
                        .help("Target OS (default: the profile's)"),
                )
                .arg(
                    Arg::new("script")
                        .long("script")
                        .help("Print the standalone font script instead of the lists")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("translate")
                .about("Translate a GLSL shader for the profile's GPU")
                .args(profile_args())
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("stage")
                        .long("stage")
                        .value_name("STAGE")
                        .default_value("fragment")
                        .value_parser(["vertex", "fragment"]),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a GLSL shader for unbalanced delimiters and a missing main()")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
}

/// Parse CLI arguments into CliArgs struct
fn parse_cli_args(matches: &ArgMatches) -> CliArgs {
    let mut args = CliArgs::default();

    args.config_file = matches.get_one::<PathBuf>("config").cloned();
    args.host_os = matches.get_one::<String>("host-os").cloned();
    args.host_dpr = matches.get_one::<f64>("host-dpr").copied();
    args.worker_fallback = matches.get_one::<String>("worker-fallback").cloned();

    if matches.get_flag("no-workers") {
        args.intercept_workers = Some(false);
    }
    if matches.get_flag("no-iframes") {
        args.intercept_iframes = Some(false);
    }
    if matches.get_flag("no-blobs") {
        args.intercept_blobs = Some(false);
    }
    if matches.get_flag("shader-noise") {
        args.shader_noise = Some(true);
    }
    if matches.get_flag("shader-banner") {
        args.shader_banner = Some(true);
    }

    args
}

/// Initialize the tracing/logging subsystem
fn init_tracing(verbosity: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // scripts go to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn load_profile(matches: &ArgMatches) -> Result<VmProfile> {
    if let Some(path) = matches.get_one::<PathBuf>("profile") {
        let profile = VmProfile::from_file(path)
            .with_context(|| format!("Failed to load profile from {}", path.display()))?;
        info!("Loaded profile {} from {}", profile.id, path.display());
        return Ok(profile);
    }
    let seed = matches
        .get_one::<String>("seed")
        .map(String::as_str)
        .unwrap_or(NAME);
    Ok(VmProfile::consistent(seed))
}

fn context_id(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("context")
        .cloned()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn parse_os(value: &str) -> Result<TargetOs> {
    value
        .parse()
        .map_err(|e| anyhow!("Invalid OS '{}': {}", value, e))
}

fn read_shader(matches: &ArgMatches) -> Result<String> {
    let path = matches
        .get_one::<PathBuf>("file")
        .ok_or_else(|| anyhow!("No shader file given"))?;
    fs::read_to_string(path).with_context(|| format!("Failed to read shader {}", path.display()))
}

fn run(matches: &ArgMatches, settings: SpoofSettings, quiet: bool) -> Result<()> {
    let registry = Arc::new(SeedRegistry::default());
    registry.set_enabled(settings.enabled);
    let manager = SpoofManager::with_registry(settings, registry.clone());

    match matches.subcommand() {
        Some(("frame", sub)) => {
            let profile = load_profile(sub)?;
            let context = context_id(sub);
            let is_main = !sub.get_flag("iframe");
            let script = if sub.get_flag("bundle") {
                manager.generate_injection_bundle(is_main, &profile, &context)
            } else {
                manager.generate_frame_script(is_main, &profile, &context)
            };
            print!("{}", script);
        }
        Some(("worker", sub)) => {
            let profile = load_profile(sub)?;
            let context = context_id(sub);
            let worker_type: ExecutionContextType = sub
                .get_one::<String>("type")
                .map(String::as_str)
                .unwrap_or("dedicated_worker")
                .parse()
                .map_err(|e: String| anyhow!(e))?;
            print!(
                "{}",
                manager.generate_worker_script(&profile, worker_type, &context)
            );
        }
        Some(("interceptors", sub)) => {
            let profile = load_profile(sub)?;
            let context = context_id(sub);
            let script = match sub.get_one::<String>("kind").map(String::as_str) {
                Some("worker") => manager.generate_worker_interceptor(&profile, &context),
                Some("iframe") => manager.generate_iframe_interceptor(&profile, &context),
                Some("blob") => manager.generate_blob_url_interceptor(&profile, &context),
                Some("early-blob") => manager.generate_early_blob_interceptor(&profile, &context),
                Some("es-module") => manager.generate_es_module_early_patch(&profile, &context),
                other => return Err(anyhow!("Unknown interceptor kind: {:?}", other)),
            };
            print!("{}", script);
        }
        Some(("detector", _)) => {
            println!("{}", manager.generate_context_detector());
        }
        Some(("seeds", sub)) => {
            let profile = load_profile(sub)?;
            let context = context_id(sub);
            registry.register_with_profile(1, &context, &profile);
            let guard = registry
                .bind(1)
                .ok_or_else(|| anyhow!("Context {} did not register", context))?;
            let bundle = guard
                .bundle()
                .ok_or_else(|| anyhow!("Spoofing is disabled; no bundle for {}", context))?;
            debug!(
                "Font hash for {}: {}",
                context,
                bundle.hash(HashKind::Fonts)
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&*bundle).context("Failed to serialize bundle")?
            );
        }
        Some(("fonts", sub)) => {
            let mut profile = load_profile(sub)?;
            if let Some(target) = sub.get_one::<String>("target") {
                profile.os.name = parse_os(target)?;
            }
            let bundle = ki_browser_spoof::seeds::SeedBundle::for_profile(&profile, &context_id(sub));
            let spoofer = manager.font_spoofer(&profile, &bundle);
            if sub.get_flag("script") {
                print!("{}", spoofer.generate_script());
            } else {
                println!(
                    "{bold}Target:{reset} {}  {dim}scale {:.3}{reset}",
                    spoofer.target(),
                    spoofer.measurement_scale(),
                    bold = colors::BOLD,
                    dim = colors::DIM,
                    reset = colors::RESET
                );
                println!("{bold}Allowed:{reset}", bold = colors::BOLD, reset = colors::RESET);
                for font in spoofer.allowed_fonts() {
                    println!("  {}", font);
                }
                println!("{bold}Hidden:{reset}", bold = colors::BOLD, reset = colors::RESET);
                for font in spoofer.hidden_fonts() {
                    println!("  {dim}{}{reset}", font, dim = colors::DIM, reset = colors::RESET);
                }
            }
        }
        Some(("translate", sub)) => {
            let profile = load_profile(sub)?;
            let source = read_shader(sub)?;
            let stage: ShaderStage = sub
                .get_one::<String>("stage")
                .map(String::as_str)
                .unwrap_or("fragment")
                .parse()
                .map_err(|e: String| anyhow!(e))?;
            let result = manager.translate_shader(&source, stage, &profile);
            print!("{}", result.translated_source);
            if !quiet {
                if result.success {
                    eprintln!(
                        "{green}translated{reset} {} changes, quirks: {}",
                        result.changes.total(),
                        result.applied_quirks.join(", "),
                        green = colors::GREEN,
                        reset = colors::RESET
                    );
                } else {
                    eprintln!(
                        "{yellow}unchanged{reset} {}",
                        result.error.as_deref().unwrap_or("translation failed"),
                        yellow = colors::YELLOW,
                        reset = colors::RESET
                    );
                }
            }
        }
        Some(("validate", sub)) => {
            let source = read_shader(sub)?;
            let violations = validate_shader(&source);
            if violations.is_empty() {
                if !quiet {
                    println!("{green}ok{reset}", green = colors::GREEN, reset = colors::RESET);
                }
            } else {
                for violation in &violations {
                    println!("{yellow}{}{reset}", violation, yellow = colors::YELLOW, reset = colors::RESET);
                }
                return Err(anyhow!("{} violation(s)", violations.len()));
            }
        }
        _ => return Err(anyhow!("No subcommand given")),
    }

    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let matches = build_cli().get_matches();

    // Get verbosity settings before loading config
    let verbosity = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");

    // Initialize logging
    init_tracing(verbosity, quiet);

    // Load configuration with full precedence chain
    let settings = parse_cli_args(&matches)
        .load_settings()
        .context("Failed to load configuration")?;
    debug!("Settings: {:?}", settings);

    run(&matches, settings, quiet)
}
