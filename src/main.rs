use std::{env, fs, process::ExitCode};

use log::error;
use vm_sim::{
    commands::{replay, Command},
    meta_commands::{handle_meta_command, MetaAction},
    repl::REPL,
    Context,
};

const PTES_PER_PAGE: usize = 16;
const NR_FRAMES: usize = 128;

fn run_script(ctx: &mut Context<PTES_PER_PAGE, NR_FRAMES>, path: &str) -> ExitCode {
    let script = match fs::read_to_string(path) {
        Ok(script) => script,
        Err(err) => {
            error!("cannot read {}: {}", path, err);
            return ExitCode::FAILURE;
        }
    };
    let steps = match replay(ctx, &script) {
        Ok(steps) => steps,
        Err(err) => {
            error!("{}: {}", path, err);
            return ExitCode::FAILURE;
        }
    };
    for step in steps {
        match step.result {
            Ok(outcome) => println!("{:>4}: {:?} => {}", step.line, step.command, outcome),
            Err(err) => println!("{:>4}: {:?} => error: {}", step.line, step.command, err),
        }
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    env_logger::init();
    let mut ctx = Context::<PTES_PER_PAGE, NR_FRAMES>::init();

    if let Some(path) = env::args().nth(1) {
        return run_script(&mut ctx, &path);
    }

    let repl = REPL {};
    loop {
        if repl.prompt(ctx.current_pid()).is_err() {
            return ExitCode::FAILURE;
        }
        let input = match repl.read_line() {
            Ok(Some(input)) => input,
            Ok(None) => return ExitCode::SUCCESS,
            Err(err) => {
                error!("cannot read input: {}", err);
                return ExitCode::FAILURE;
            }
        };

        if input.starts_with('.') {
            match handle_meta_command(&input, &ctx) {
                Ok(MetaAction::Exit) => return ExitCode::SUCCESS,
                Ok(MetaAction::Print(report)) => print!("{}", report),
                Err(_) => println!("Unrecognized command '{}'", input),
            }
            continue;
        }

        match Command::parse(&input) {
            Ok(Some(command)) => match command.execute(&mut ctx) {
                Ok(outcome) => println!("{}", outcome),
                Err(err) => println!("error: {}", err),
            },
            Ok(None) => {}
            Err(err) => println!("{}", err),
        }
    }
}
