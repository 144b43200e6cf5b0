use std::io::Write;
use std::panic;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Import everything from the lib version of ourselves
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use cli::{BuildArgs, Cli, Commands, OutputFormat};
use console::Term;
use miette::{Diagnostic, IntoDiagnostic};
use shipyard::{
    config::{
        load_shipyard_toml, BuildSettings, Config, ProjectConfig, SignSettings, TestSettings,
        UploadSettings, VersionSettings,
    },
    errors::DistError,
    process::{ProcessRunner, Tools},
    summary::ReportSummary,
};
use shipyard_schema::DistReport;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

mod cli;

type ReportErrorFunc = dyn Fn(&miette::Report) + Send + Sync + 'static;

static REPORT_ERROR: Mutex<Option<Box<ReportErrorFunc>>> = Mutex::new(None);

fn set_report_errors_as_json() {
    if let Ok(mut guard) = REPORT_ERROR.lock() {
        *guard = Some(Box::new(move |error| {
            // Manually invoke JSONReportHandler to format the error as a report
            // to out_.
            let mut report = String::new();
            if miette::JSONReportHandler::new()
                .render_report(&mut report, error.as_ref())
                .is_err()
            {
                report = format!("{:?}", error.to_string());
            }
            let _ = writeln!(&mut Term::stdout(), r#"{{"error": {report}}}"#);
        }));
    }
}

fn report_error(error: &miette::Report) {
    if let Ok(guard) = REPORT_ERROR.lock() {
        if let Some(do_report) = &*guard {
            do_report(error);
            return;
        }
    }
    error!("{:?}", error);
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version come through here too
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    // Init the logger
    tracing_subscriber::fmt::fmt()
        .with_max_level(cli.verbose)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .with_ansi(console::colors_enabled_stderr())
        .init();

    // Control how errors are formatted by setting the miette hook. This will
    // only be used for errors presented to humans, when formatting an error as
    // JSON, it will be handled by a custom `report_error` override, bypassing
    // the hook.
    let _ = miette::set_hook(Box::new(move |_| {
        let graphical_theme = if console::colors_enabled_stderr() {
            miette::GraphicalTheme::unicode()
        } else {
            miette::GraphicalTheme::unicode_nocolor()
        };
        Box::new(
            miette::MietteHandlerOpts::new()
                .graphical_theme(graphical_theme)
                .build(),
        )
    }));

    // Now that miette is set up, use it to format panics.
    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            msg
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            &msg[..]
        } else {
            "something went wrong"
        };

        #[derive(Debug, Error, Diagnostic)]
        #[error("{message}")]
        pub struct PanicError {
            pub message: String,
            #[help]
            pub help: Option<String>,
        }

        report_error(
            &miette::Report::from(PanicError {
                message: message.to_owned(),
                help: panic_info
                    .location()
                    .map(|loc| format!("at {}:{}:{}", loc.file(), loc.line(), loc.column())),
            })
            .wrap_err("shipyard panicked"),
        );
    }));

    // If we're outputting JSON, replace the error report method such that it
    // writes errors out to the normal output stream as JSON.
    if cli.output_format == OutputFormat::Json {
        set_report_errors_as_json();
    }

    let main_result = real_main(&cli);

    let _ = main_result.map_err(|e| {
        report_error(&e);
        std::process::exit(1);
    });
}

fn real_main(cli: &Cli) -> Result<(), miette::Report> {
    match &cli.command {
        Some(Commands::Build(args)) => cmd_build(cli, args),
        Some(Commands::Plan(args)) => cmd_plan(cli, args),
        Some(Commands::ManifestSchema) => cmd_manifest_schema(cli),
        None => cmd_build(cli, &BuildArgs::default()),
    }
}

fn print_human(out: &mut Term, report: &DistReport) -> Result<(), std::io::Error> {
    writeln!(out, "{}", ReportSummary(report))?;
    Ok(())
}

fn print_json(out: &mut Term, report: &DistReport) -> Result<(), std::io::Error> {
    let string = serde_json::to_string_pretty(report)?;
    writeln!(out, "{string}")?;
    Ok(())
}

fn print_report(cli: &Cli, report: &DistReport) -> Result<(), miette::Report> {
    let mut out = Term::stdout();
    match cli.output_format {
        OutputFormat::Human => print_human(&mut out, report).into_diagnostic()?,
        OutputFormat::Json => print_json(&mut out, report).into_diagnostic()?,
    }
    Ok(())
}

/// Run `f` with a tokio runtime entered and tools discovered
///
/// ctrl-c cancels the run's token, which kills whatever tools are running.
fn with_tools<T>(
    timeout: Option<Duration>,
    f: impl FnOnce(&Tools, &CancellationToken) -> Result<T, miette::Report>,
) -> Result<T, miette::Report> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    let _guard = runtime.enter();

    let cancel = CancellationToken::new();
    let interrupted = cancel.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            interrupted.cancel();
        }
    });

    let runner = ProcessRunner::new(timeout, cancel.clone());
    let tools = Tools::discover(Arc::new(runner));
    f(&tools, &cancel)
}

fn cmd_build(cli: &Cli, args: &BuildArgs) -> Result<(), miette::Report> {
    let cfg = build_config(cli, args)?;
    // reject a bad selection before probing for tools
    shipyard::plan_work(&cfg)?;
    let report = with_tools(cfg.timeout, |tools, cancel| {
        Ok(shipyard::do_build(&cfg, tools, cancel)?)
    })?;
    print_report(cli, &report)
}

fn cmd_plan(cli: &Cli, args: &BuildArgs) -> Result<(), miette::Report> {
    let cfg = build_config(cli, args)?;
    shipyard::plan_work(&cfg)?;
    let report = with_tools(cfg.timeout, |tools, _| Ok(shipyard::do_plan(&cfg, tools)?))?;
    print_report(cli, &report)
}

fn cmd_manifest_schema(_cli: &Cli) -> Result<(), miette::Report> {
    let schema = DistReport::json_schema();
    let json_schema = serde_json::to_string_pretty(&schema).into_diagnostic()?;
    writeln!(&mut Term::stdout(), "{json_schema}").into_diagnostic()?;
    Ok(())
}

fn absolute(cwd: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        cwd.join(path)
    }
}

fn build_config(cli: &Cli, args: &BuildArgs) -> Result<Config, miette::Report> {
    let cwd = std::env::current_dir().into_diagnostic()?;
    let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|path| DistError::NonUtf8Path { path })?;
    let checkout = absolute(&cwd, &cli.checkout);
    let outdir = absolute(&cwd, &args.outdir);

    let toml = load_shipyard_toml(&checkout, cli.config.as_deref())?;
    let fallback_name = checkout
        .canonicalize_utf8()
        .ok()
        .and_then(|p| p.file_name().map(ToOwned::to_owned))
        .unwrap_or_else(|| "app".to_owned());
    let project = ProjectConfig::resolve(toml, args.name.as_deref(), &fallback_name);
    let default_bucket = project.bucket.clone();

    let mut cfg = Config::new(checkout, outdir, project);
    if let Some(platform) = &args.platform {
        cfg.selection.platform = platform.clone();
    }
    if let Some(arch) = &args.arch {
        cfg.selection.arch = arch.clone();
    }
    cfg.selection.formats = args.package_format.clone();
    cfg.selection.static_all = args.static_build;
    cfg.version = VersionSettings {
        version: args.version.clone(),
        branch: args.branch.clone(),
        commit: args.commit.clone(),
        iteration: args.iteration.clone(),
        rc: args.rc,
        nightly: args.nightly,
        release: args.release,
    };
    cfg.build = BuildSettings {
        race: args.race,
        clean: args.clean,
        update: args.update,
        no_get: args.no_get,
        tags: args.tags.clone(),
    };
    cfg.test = args.test.then(|| TestSettings {
        vet: !args.no_vet,
        parallel: args.parallel,
        timeout: args.test_timeout.clone(),
    });
    cfg.package = args.package || !args.package_format.is_empty();
    cfg.package_arch = args.package_arch.clone();
    cfg.sign = (args.sign || args.sign_required).then(|| SignSettings {
        required: args.sign_required,
        key: args.sign_key.clone(),
    });
    cfg.upload = args.upload.then(|| UploadSettings {
        destination: args.bucket.clone().or(default_bucket).unwrap_or_default(),
        overwrite: args.overwrite,
    });
    if let Some(jobs) = args.jobs {
        cfg.jobs = jobs;
    }
    cfg.timeout = args.timeout.map(Duration::from_secs);
    cfg.checksum = args.checksum.to_lib();
    Ok(cfg)
}
