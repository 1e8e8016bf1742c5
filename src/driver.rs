use std::{
    env::{self, Args},
    fs,
    path::PathBuf,
    process::{self, Command},
};

use anyhow::{bail, Context};

use crate::{codegen, diagnostics, lexer, parser, CompileError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Compile,
    Lex,
    Parse,
    Assembly,
}

#[derive(Debug)]
pub struct Options {
    stage: Stage,
    input_file: PathBuf,
    assembly_file: PathBuf,
    output_file: PathBuf,
}

fn print_help(program: Option<&str>) -> ! {
    println!("{} FILE [--lex | --parse | -S]", program.unwrap_or("rmcc"));
    process::exit(1)
}

fn is_flag(string: &str) -> Option<Stage> {
    match string {
        "--lex" => Some(Stage::Lex),
        "--parse" => Some(Stage::Parse),
        "-S" => Some(Stage::Assembly),
        _ => None,
    }
}

impl Options {
    /// This function will exit if the args don't match what was expected.
    pub fn parse_args(mut args: Args) -> Self {
        let program = args.next();

        let mut stage: Stage = Default::default();
        let mut file_path: Option<PathBuf> = None;

        for arg in args {
            if let Some(found) = is_flag(&arg) {
                stage = found;
                continue;
            }

            if file_path.is_some() {
                println!("unrecognized flag or extra input file: {arg}");
                print_help(program.as_deref());
            }
            file_path = Some(PathBuf::from(arg));
        }

        let Some(input_file) = file_path else {
            println!("no input file");
            print_help(program.as_deref());
        };

        let mut assembly_file = input_file.clone();
        assembly_file.set_extension("s");
        let mut output_file = input_file.clone();
        output_file.set_extension("");

        Self {
            stage,
            input_file,
            assembly_file,
            output_file,
        }
    }

    pub fn run_assembler(&self) -> anyhow::Result<()> {
        let status = Command::new("gcc")
            .arg(self.assembly_file.as_os_str())
            .arg("-o")
            .arg(self.output_file.as_os_str())
            .status()
            .context("could not run gcc")?;

        if !status.success() {
            bail!("gcc exited with {status}");
        }

        Ok(())
    }
}

/// Lex, parse, and generate, honoring the requested stop stage. `Ok(None)`
/// means the stage finished before assembly was produced.
fn run_pipeline(stage: Stage, source: &str) -> Result<Option<String>, CompileError> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    if stage == Stage::Lex {
        return Ok(None);
    }

    let program = parser::Parser::new(tokens).parse_program()?;
    if stage == Stage::Parse {
        println!("{program:#?}");
        return Ok(None);
    }

    Ok(Some(codegen::generate_program(&program)?))
}

fn report_and_exit(source: &str, err: CompileError) -> ! {
    match err.offset() {
        Some(offset) => eprintln!("{}", diagnostics::render(source, offset, &err.to_string())),
        None => eprintln!("{err}"),
    }
    process::exit(1)
}

pub fn run() -> anyhow::Result<()> {
    let opts = Options::parse_args(env::args());

    let source = fs::read_to_string(&opts.input_file)
        .with_context(|| format!("could not read {}", opts.input_file.display()))?;

    let assembly = match run_pipeline(opts.stage, &source) {
        Ok(Some(assembly)) => assembly,
        Ok(None) => return Ok(()),
        Err(err) => report_and_exit(&source, err),
    };

    fs::write(&opts.assembly_file, assembly)
        .with_context(|| format!("could not write {}", opts.assembly_file.display()))?;

    if opts.stage == Stage::Assembly {
        return Ok(());
    }

    opts.run_assembler()?;

    if let Err(err) = fs::remove_file(&opts.assembly_file) {
        eprintln!(
            "WARN: Could not remove the file {:?} due to {}, finishing...",
            &opts.assembly_file, err
        );
    }

    Ok(())
}
