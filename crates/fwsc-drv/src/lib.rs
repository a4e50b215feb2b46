//! fwsc-drv - Compiler Driver
//!
//! Entry point and orchestrator for the pipeline:
//!
//! ```text
//! input.scala
//!      │
//!      ▼
//!  [Read file]
//!      │
//!      ▼
//!  [fwsc-lex]  ──▶ tokens
//!      │
//!      ▼
//!  [fwsc-par]  ──▶ untyped AST
//!      │
//!      ▼
//!  [fwsc-sem]  ──▶ typed tree
//!      │
//!      ▼
//!  [fwsc-gen]  ──▶ C source
//!      │
//!      ▼
//!  output.c
//! ```
//!
//! Any phase error is rendered once, as an annotated source line with a
//! caret and (where available) a hint, and the process exits non-zero.
//! There is no recovery and no multi-error accumulation.
//!
//! ```text
//! USAGE:
//!   fwsc input.scala [-o output.c] [--emit-tokens] [--emit-ast]
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use fwsc_util::diagnostic::Diagnostic;
use fwsc_util::{NameGen, SourceMap};

/// Driver configuration, parsed from argv.
#[derive(Debug, Clone)]
pub struct Config {
    /// Input source file.
    pub input: PathBuf,
    /// Output C file. Defaults to the input with a `.c` extension.
    pub output: Option<PathBuf>,
    /// Dump the token stream to stdout.
    pub emit_tokens: bool,
    /// Dump the untyped AST to stdout.
    pub emit_ast: bool,
}

impl Config {
    /// Parse command-line arguments (without the program name).
    pub fn from_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Config> {
        let mut input = None;
        let mut output = None;
        let mut emit_tokens = false;
        let mut emit_ast = false;

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-o" | "--output" => {
                    let path = iter
                        .next()
                        .ok_or_else(|| anyhow!("`{}` needs a path argument", arg))?;
                    output = Some(PathBuf::from(path));
                }
                "--emit-tokens" => emit_tokens = true,
                "--emit-ast" => emit_ast = true,
                "-h" | "--help" => {
                    bail!("usage: fwsc input.scala [-o output.c] [--emit-tokens] [--emit-ast]")
                }
                flag if flag.starts_with('-') => bail!("unknown flag `{}`", flag),
                path => {
                    if input.is_some() {
                        bail!("multiple input files are not supported");
                    }
                    input = Some(PathBuf::from(path));
                }
            }
        }

        Ok(Config {
            input: input.ok_or_else(|| {
                anyhow!("usage: fwsc input.scala [-o output.c] [--emit-tokens] [--emit-ast]")
            })?,
            output,
            emit_tokens,
            emit_ast,
        })
    }

    /// The output path, defaulting to the input with a `.c` extension.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.with_extension("c"))
    }
}

/// One compilation: the source map plus the driver configuration.
pub struct Session {
    pub config: Config,
    pub source_map: SourceMap,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source_map: SourceMap::new(),
        }
    }

    /// Compile the configured input file to a C string.
    pub fn compile(&mut self) -> anyhow::Result<String> {
        let path = self.config.input.clone();
        let src = fs::read_to_string(&path)
            .with_context(|| format!("can not read `{}`", path.display()))?;
        let file_id = self
            .source_map
            .add_file(path.display().to_string(), src.clone());

        let tokens = match fwsc_lex::tokenize(&src, file_id) {
            Ok(tokens) => tokens,
            Err(e) => return Err(self.report(Diagnostic::error(e.to_string(), e.span()))),
        };
        if self.config.emit_tokens {
            for token in &tokens {
                println!("{:?}", token);
            }
        }

        let program = match fwsc_par::parse(tokens) {
            Ok(program) => program,
            Err(e) => {
                let mut diag = Diagnostic::error(e.to_string(), e.span());
                if let fwsc_par::ParseError::MissingElse { .. } = e {
                    diag = diag.with_help("every `if` is an expression; add `else <expr>`");
                }
                return Err(self.report(diag));
            }
        };
        if self.config.emit_ast {
            println!("{:#?}", program);
        }

        let (hir, module) = match fwsc_sem::type_check(&program) {
            Ok(checked) => checked,
            Err(e) => {
                let mut diag =
                    Diagnostic::error(e.message.clone(), e.span).with_sub_spans(e.sub_spans);
                if e.message.starts_with("can not assign to immutable") {
                    diag = diag
                        .with_help("declare the binding with `var` to allow reassignment");
                }
                if e.message.contains("no `main` entry point") {
                    diag = diag.with_help(
                        "declare a top-level `val main = () => ...` or a class Main with a `main` member",
                    );
                }
                return Err(self.report(diag));
            }
        };

        match fwsc_gen::emit(&hir, &module, NameGen::new()) {
            Ok(c_source) => Ok(c_source),
            Err(e) => Err(self.report(Diagnostic::error(
                e.to_string(),
                fwsc_util::Span::DUMMY,
            ))),
        }
    }

    /// Render a diagnostic to stderr and produce the fatal error the
    /// binary exits with.
    fn report(&self, diag: Diagnostic) -> anyhow::Error {
        eprintln!("{}", diag.render(&self.source_map));
        anyhow!("compilation failed")
    }
}

/// Run one compilation according to `config`.
pub fn run(config: Config) -> anyhow::Result<()> {
    let output = config.output_path();
    let mut session = Session::new(config);
    let c_source = session.compile()?;
    fs::write(&output, c_source)
        .with_context(|| format!("can not write `{}`", output.display()))?;
    Ok(())
}

/// Binary entry point: parse argv, compile.
pub fn main() -> anyhow::Result<()> {
    let config = Config::from_args(std::env::args().skip(1))?;
    run(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_config_minimal() {
        let config = Config::from_args(args(&["prog.scala"])).unwrap();
        assert_eq!(config.input, PathBuf::from("prog.scala"));
        assert_eq!(config.output_path(), PathBuf::from("prog.c"));
        assert!(!config.emit_tokens);
    }

    #[test]
    fn test_config_output_flag() {
        let config = Config::from_args(args(&["prog.scala", "-o", "out/main.c"])).unwrap();
        assert_eq!(config.output_path(), PathBuf::from("out/main.c"));
    }

    #[test]
    fn test_config_emit_flags() {
        let config =
            Config::from_args(args(&["--emit-tokens", "--emit-ast", "prog.scala"])).unwrap();
        assert!(config.emit_tokens);
        assert!(config.emit_ast);
    }

    #[test]
    fn test_config_rejects_unknown_flag() {
        assert!(Config::from_args(args(&["--frobnicate", "prog.scala"])).is_err());
    }

    #[test]
    fn test_config_requires_input() {
        assert!(Config::from_args(args(&[])).is_err());
    }

    #[test]
    fn test_config_rejects_two_inputs() {
        assert!(Config::from_args(args(&["a.scala", "b.scala"])).is_err());
    }
}
