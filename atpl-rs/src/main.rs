use std::io::{self, Read, Write};
use std::path::Path;

use atpl::cli::{self, CliArgs, Input, VarsFile};
use atpl::config::Config;
use atpl::{Engine, Environment};
use tracing::debug;

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("atpl: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };

    atpl::init_tracing(args.debug);

    if let Err(e) = run(args) {
        eprintln!("atpl: {e}");
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<(), String> {
    let engine = Engine::new();

    // ── Variables file ────────────────────────────────────────────────────────
    let mut env = match args.vars_file {
        VarsFile::Skip => Environment::new(),
        VarsFile::Explicit(path) => load_vars(&engine, &path)?,
        VarsFile::Search => match cli::find_user_config() {
            Some(path) => load_vars(&engine, &path)?,
            None => Environment::new(),
        },
    };

    // ── -D definitions, evaluated in order ────────────────────────────────────
    for (name, expr) in &args.defines {
        let value = engine
            .evaluate(expr, &env)
            .map_err(|e| format!("-D{name}: {e}"))?;
        env.set(name.as_str(), value);
    }

    // ── Template ──────────────────────────────────────────────────────────────
    let template = match &args.template {
        Input::Stdin => {
            let mut s = String::new();
            io::stdin()
                .read_to_string(&mut s)
                .map_err(|e| format!("cannot read stdin: {e}"))?;
            s
        }
        Input::Path(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?,
    };

    let out = engine.render(&template, &mut env).map_err(|e| e.to_string())?;

    match &args.output {
        Some(path) => std::fs::write(path, out)
            .map_err(|e| format!("cannot write {}: {e}", path.display()))?,
        None => io::stdout()
            .write_all(out.as_bytes())
            .map_err(|e| format!("cannot write stdout: {e}"))?,
    }
    Ok(())
}

fn load_vars(engine: &Engine, path: &Path) -> Result<Environment, String> {
    debug!(path = %path.display(), "loading variables");
    let (config, errors) = Config::load_file(engine, path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    for e in errors {
        eprintln!("atpl: warning: {}: {e}", path.display());
    }
    Ok(config.vars)
}
