//! The `asdl` command-line shell.
//!
//! A thin wrapper over the `asdl` core API: argument parsing, `.asdlrc`
//! defaults, environment merging, diagnostics rendering, and exit codes.
//! Compilation logic never lives here.

use std::{env, fs, path::PathBuf, process::ExitCode};

use asdl::{
    CompileOptions, DumpStage, EnvSnapshot, TopPolicy, compile, has_errors, query_bindings, query_tree,
    resolve_top_module, sidecar_json, sort_stable,
};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: asdl <command> [options] <entry.asdl>

commands:
  compile    compile an entry file and emit a netlist
  query      print a read-only projection (tree or bindings)

options:
  --lib-root <dir>          library root, repeatable; searched before ASDL_LIB_PATH
  --backend-config <file>   backend template config (or ASDL_BACKEND_CONFIG)
  --backend <name>          backend name for device templates (default: ngspice)
  --view-config <file>      view binding configuration
  --view-profile <name>     profile within the view config
  --binding-sidecar <file>  write the resolved view bindings as JSON
  --top-as-subckt           wrap the top module in a subckt
  --dump <stage>            dump 'patterned' or 'atomized' graph text, repeatable
  --no-verify               skip post-atomization integrity verification
  --query <kind>            with `query`: 'tree' or 'bindings'
  --rc <file>               .asdlrc path (default: ./.asdlrc when present)
  -o <path>                 output file (default: stdout)
";

struct CliArgs {
    command: String,
    entry: Option<PathBuf>,
    options: CompileOptions,
    sidecar: Option<PathBuf>,
    query_kind: Option<String>,
    rc_path: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let command = args.next().ok_or_else(|| "missing command".to_owned())?;
    if !matches!(command.as_str(), "compile" | "query") {
        return Err(format!("unknown command '{command}'"));
    }

    let mut parsed = CliArgs {
        command,
        entry: None,
        options: CompileOptions::new(""),
        sidecar: None,
        query_kind: None,
        rc_path: None,
        output: None,
    };

    while let Some(arg) = args.next() {
        let mut value_for = |flag: &str| args.next().ok_or_else(|| format!("{flag} requires a value"));
        match arg.as_str() {
            "--lib-root" => parsed.options.lib_roots.push(PathBuf::from(value_for("--lib-root")?)),
            "--backend-config" => parsed.options.backend_config = Some(PathBuf::from(value_for("--backend-config")?)),
            "--backend" => parsed.options.backend = value_for("--backend")?,
            "--view-config" => parsed.options.view_config = Some(PathBuf::from(value_for("--view-config")?)),
            "--view-profile" => parsed.options.view_profile = Some(value_for("--view-profile")?),
            "--binding-sidecar" => parsed.sidecar = Some(PathBuf::from(value_for("--binding-sidecar")?)),
            "--top-as-subckt" => parsed.options.top_as_subckt = true,
            "--no-verify" => parsed.options.verify = false,
            "--dump" => match value_for("--dump")?.as_str() {
                "patterned" => parsed.options.dumps.push(DumpStage::Patterned),
                "atomized" => parsed.options.dumps.push(DumpStage::Atomized),
                other => return Err(format!("unknown dump stage '{other}'")),
            },
            "--query" => parsed.query_kind = Some(value_for("--query")?),
            "--rc" => parsed.rc_path = Some(PathBuf::from(value_for("--rc")?)),
            "-o" => parsed.output = Some(PathBuf::from(value_for("-o")?)),
            other if other.starts_with('-') => return Err(format!("unknown option '{other}'")),
            entry => {
                if parsed.entry.is_some() {
                    return Err(format!("unexpected extra argument '{entry}'"));
                }
                parsed.entry = Some(PathBuf::from(entry));
            }
        }
    }

    let entry = parsed.entry.clone().ok_or_else(|| "missing entry file".to_owned())?;
    parsed.options.entry = entry;
    Ok(parsed)
}

/// Merges `.asdlrc` defaults: lib roots and backend config fill gaps in the
/// CLI arguments, env entries are set only for keys that are still unset.
fn apply_rc(parsed: &mut CliArgs) -> Result<(), String> {
    let rc_path = parsed
        .rc_path
        .clone()
        .or_else(|| {
            let default = PathBuf::from(".asdlrc");
            default.is_file().then_some(default)
        });
    let Some(rc_path) = rc_path else { return Ok(()) };

    let rc = asdl::rcfile::load_rc(&rc_path).map_err(|diag| diag.to_string())?;
    parsed.options.lib_roots.extend(rc.lib_roots);
    if parsed.options.backend_config.is_none() {
        parsed.options.backend_config = rc.backend_config;
    }
    for (key, value) in &rc.env {
        if env::var_os(key).is_none() {
            // SAFETY: the CLI is single-threaded at this point; the merge
            // happens once, before the pipeline snapshots the environment.
            unsafe { env::set_var(key, value) };
        }
    }
    Ok(())
}

fn write_output(output: Option<&PathBuf>, text: &str) -> Result<(), String> {
    match output {
        Some(path) => fs::write(path, text).map_err(|err| format!("cannot write '{}': {err}", path.display())),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut parsed = match parse_args(env::args().skip(1)) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(message) = apply_rc(&mut parsed) {
        eprintln!("error: {message}");
        return ExitCode::FAILURE;
    }

    let env_snapshot = EnvSnapshot::capture();
    let output = compile(&parsed.options, &env_snapshot);

    let mut diags = output.diagnostics.clone();
    sort_stable(&mut diags);
    for diag in &diags {
        eprintln!("{diag}");
    }
    for (stage, text) in &output.dumps {
        eprintln!("---- {stage} ----");
        eprint!("{text}");
    }

    if has_errors(&output.diagnostics) {
        return ExitCode::FAILURE;
    }

    let result = match parsed.command.as_str() {
        "compile" => run_compile(&parsed, &output),
        "query" => run_query(&parsed, &output),
        _ => unreachable!("commands are validated during parsing"),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run_compile(parsed: &CliArgs, output: &asdl::CompileOutput) -> Result<(), String> {
    if let (Some(sidecar_path), Some(binding), Some(profile)) =
        (&parsed.sidecar, &output.binding, &parsed.options.view_profile)
    {
        let json = sidecar_json(profile, &binding.entries);
        let text = serde_json::to_string_pretty(&json).expect("sidecar serializes");
        fs::write(sidecar_path, text)
            .map_err(|err| format!("cannot write '{}': {err}", sidecar_path.display()))?;
    }
    if let Some(netlist) = &output.netlist {
        write_output(parsed.output.as_ref(), netlist)?;
    }
    Ok(())
}

fn run_query(parsed: &CliArgs, output: &asdl::CompileOutput) -> Result<(), String> {
    let graph = output.atomized.as_ref().ok_or_else(|| "no atomized graph produced".to_owned())?;
    let kind = parsed.query_kind.as_deref().unwrap_or("tree");
    let envelope = match kind {
        "tree" => {
            let (top, _, notes) = resolve_top_module(graph, TopPolicy::Permissive);
            let top = top.ok_or_else(|| {
                format!("cannot resolve a top module for the tree query ({})", notes.join("; "))
            })?;
            query_tree(graph, top, output.binding.as_ref(), output.realized.as_ref())
        }
        "bindings" => {
            let binding = output
                .binding
                .as_ref()
                .ok_or_else(|| "query bindings requires --view-config and --view-profile".to_owned())?;
            query_bindings(binding)
        }
        other => return Err(format!("unknown query kind '{other}'")),
    };
    let text = serde_json::to_string_pretty(&envelope).expect("envelope serializes");
    write_output(parsed.output.as_ref(), &format!("{text}\n"))
}
