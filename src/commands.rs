use std::fmt;
use std::str::SplitWhitespace;

use log::debug;
use page_table::Access;

use crate::{Context, Pfn, Pid, Switched, VmError, Vpn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Alloc(Vpn, Access),
    Free(Vpn),
    Fault(Vpn, Access),
    Switch(Pid),
    Lookup(Vpn),
    Insert(Vpn, Pfn),
    Invalidate(Vpn),
    Flush,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnrecognizedCommand(String),
    MissingArgument(&'static str),
    InvalidNumber(String),
    InvalidAccess(String),
    TrailingInput(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnrecognizedCommand(word) => write!(f, "unrecognized command '{}'", word),
            ParseError::MissingArgument(name) => write!(f, "missing argument <{}>", name),
            ParseError::InvalidNumber(word) => write!(f, "'{}' is not a number", word),
            ParseError::InvalidAccess(word) => write!(f, "'{}' is not r or w", word),
            ParseError::TrailingInput(word) => write!(f, "unexpected '{}'", word),
        }
    }
}

/// Result of a successfully executed [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allocated(Pfn),
    Freed,
    Resolved,
    Switched(Switched),
    Translation(Option<Pfn>),
    Done,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Allocated(pfn) => write!(f, "allocated frame {}", pfn),
            Outcome::Freed => write!(f, "freed"),
            Outcome::Resolved => write!(f, "fault resolved"),
            Outcome::Switched(Switched::Resumed(pid)) => write!(f, "switched to pid {}", pid),
            Outcome::Switched(Switched::Forked(pid)) => write!(f, "forked pid {}", pid),
            Outcome::Translation(Some(pfn)) => write!(f, "tlb hit: frame {}", pfn),
            Outcome::Translation(None) => write!(f, "tlb miss"),
            Outcome::Done => write!(f, "ok"),
        }
    }
}

fn parse_access(word: &str) -> Result<Access, ParseError> {
    match word {
        "r" | "read" => Ok(Access::Read),
        "w" | "write" => Ok(Access::Write),
        other => Err(ParseError::InvalidAccess(other.to_string())),
    }
}

fn parse_number(word: &str) -> Result<u32, ParseError> {
    word.parse()
        .map_err(|_| ParseError::InvalidNumber(word.to_string()))
}

struct Args<'a> {
    words: SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next(&mut self, name: &'static str) -> Result<&'a str, ParseError> {
        self.words.next().ok_or(ParseError::MissingArgument(name))
    }

    fn number(&mut self, name: &'static str) -> Result<u32, ParseError> {
        parse_number(self.next(name)?)
    }

    fn access(&mut self) -> Result<Access, ParseError> {
        parse_access(self.next("r|w")?)
    }

    fn finish(mut self) -> Result<(), ParseError> {
        match self.words.next() {
            Some(word) => Err(ParseError::TrailingInput(word.to_string())),
            None => Ok(()),
        }
    }
}

impl Command {
    /// Parses one line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
        let line = match line.find('#') {
            Some(index) => &line[..index],
            None => line,
        };
        let mut words = line.split_whitespace();
        let keyword = match words.next() {
            Some(keyword) => keyword,
            None => return Ok(None),
        };
        let mut args = Args { words };
        let command = match keyword {
            "alloc" => Command::Alloc(args.number("vpn")?, args.access()?),
            "free" => Command::Free(args.number("vpn")?),
            "fault" => Command::Fault(args.number("vpn")?, args.access()?),
            "switch" => Command::Switch(args.number("pid")?),
            "lookup" => Command::Lookup(args.number("vpn")?),
            "insert" => Command::Insert(args.number("vpn")?, args.number("pfn")?),
            "invalidate" => Command::Invalidate(args.number("vpn")?),
            "flush" => Command::Flush,
            other => return Err(ParseError::UnrecognizedCommand(other.to_string())),
        };
        args.finish()?;
        Ok(Some(command))
    }

    pub fn execute<const PTES_PER_PAGE: usize, const NR_FRAMES: usize>(
        &self,
        ctx: &mut Context<PTES_PER_PAGE, NR_FRAMES>,
    ) -> Result<Outcome, VmError> {
        debug!("pid {}: {:?}", ctx.current_pid(), self);
        match *self {
            Command::Alloc(vpn, access) => ctx.allocate(vpn, access).map(Outcome::Allocated),
            Command::Free(vpn) => ctx.deallocate(vpn).map(|_| Outcome::Freed),
            Command::Fault(vpn, access) => ctx.handle_fault(vpn, access).map(|_| Outcome::Resolved),
            Command::Switch(pid) => ctx.request_process(pid).map(Outcome::Switched),
            Command::Lookup(vpn) => Ok(Outcome::Translation(ctx.lookup_translation(vpn))),
            Command::Insert(vpn, pfn) => {
                ctx.insert_translation(vpn, pfn);
                Ok(Outcome::Done)
            }
            Command::Invalidate(vpn) => {
                ctx.invalidate_translation(vpn);
                Ok(Outcome::Done)
            }
            Command::Flush => {
                ctx.flush_translations();
                Ok(Outcome::Done)
            }
        }
    }
}

/// One executed line of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub line: usize,
    pub command: Command,
    pub result: Result<Outcome, VmError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub line: usize,
    pub error: ParseError,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}

/// Parses the whole script, then executes it line by line.
///
/// A failing command is recorded in its [`Step`] and does not stop the
/// replay; a line that does not parse rejects the script before anything
/// runs.
pub fn replay<const PTES_PER_PAGE: usize, const NR_FRAMES: usize>(
    ctx: &mut Context<PTES_PER_PAGE, NR_FRAMES>,
    script: &str,
) -> Result<Vec<Step>, ScriptError> {
    let mut commands = Vec::new();
    for (index, line) in script.lines().enumerate() {
        let parsed = Command::parse(line).map_err(|error| ScriptError {
            line: index + 1,
            error,
        })?;
        if let Some(command) = parsed {
            commands.push((index + 1, command));
        }
    }

    Ok(commands
        .into_iter()
        .map(|(line, command)| Step {
            line,
            command,
            result: command.execute(ctx),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::Write;

    use page_table::Access;
    use serial_test::serial;

    use super::*;
    use crate::FaultCause;

    static TEST_SCRIPT: &str = "test_script.vm";

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("alloc 3 w"), Ok(Some(Command::Alloc(3, Access::Write))));
        assert_eq!(Command::parse("  fault 10 read "), Ok(Some(Command::Fault(10, Access::Read))));
        assert_eq!(Command::parse("switch 2 # fork"), Ok(Some(Command::Switch(2))));
        assert_eq!(Command::parse("insert 1 9"), Ok(Some(Command::Insert(1, 9))));
        assert_eq!(Command::parse("flush"), Ok(Some(Command::Flush)));
        assert_eq!(Command::parse("# comment"), Ok(None));
        assert_eq!(Command::parse(""), Ok(None));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            Command::parse("map 1"),
            Err(ParseError::UnrecognizedCommand("map".to_string()))
        );
        assert_eq!(Command::parse("alloc 1"), Err(ParseError::MissingArgument("r|w")));
        assert_eq!(
            Command::parse("free x"),
            Err(ParseError::InvalidNumber("x".to_string()))
        );
        assert_eq!(
            Command::parse("alloc 1 rw"),
            Err(ParseError::InvalidAccess("rw".to_string()))
        );
        assert_eq!(
            Command::parse("flush now"),
            Err(ParseError::TrailingInput("now".to_string()))
        );
    }

    #[test]
    fn execute_commands() {
        let mut ctx = Context::<4, 8>::init();
        assert_eq!(Command::Alloc(0, Access::Write).execute(&mut ctx), Ok(Outcome::Allocated(0)));
        assert_eq!(Command::Insert(0, 0).execute(&mut ctx), Ok(Outcome::Done));
        assert_eq!(Command::Lookup(0).execute(&mut ctx), Ok(Outcome::Translation(Some(0))));
        assert_eq!(
            Command::Switch(1).execute(&mut ctx),
            Ok(Outcome::Switched(Switched::Forked(1)))
        );
        assert_eq!(Command::Lookup(0).execute(&mut ctx), Ok(Outcome::Translation(None)));
        assert_eq!(Command::Fault(0, Access::Write).execute(&mut ctx), Ok(Outcome::Resolved));
        assert_eq!(Command::Free(0).execute(&mut ctx), Ok(Outcome::Freed));
    }

    #[test]
    fn replay_keeps_going_after_failure() {
        let mut ctx = Context::<4, 8>::init();
        let steps = replay(&mut ctx, "alloc 0 r\nfault 0 w\n\nalloc 1 w\n").unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[1].result,
            Err(VmError::AccessViolation(FaultCause::WriteToReadOnly))
        );
        assert_eq!(steps[2].line, 4);
        assert_eq!(steps[2].result, Ok(Outcome::Allocated(1)));
    }

    #[test]
    fn replay_rejects_bad_script() {
        let mut ctx = Context::<4, 8>::init();
        let err = replay(&mut ctx, "alloc 0 r\nbogus\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(ctx.entry(0), Ok(None));
    }

    #[test]
    #[serial]
    fn replay_script_file() {
        let mut file = File::create(TEST_SCRIPT).unwrap();
        writeln!(file, "alloc 0 w").unwrap();
        writeln!(file, "alloc 1 r").unwrap();
        writeln!(file, "switch 1").unwrap();
        writeln!(file, "fault 0 w").unwrap();
        writeln!(file, "switch 0").unwrap();
        writeln!(file, "fault 0 w").unwrap();
        drop(file);

        let script = fs::read_to_string(TEST_SCRIPT).unwrap();
        let mut ctx = Context::<4, 8>::init();
        let steps = replay(&mut ctx, &script).unwrap();
        assert!(steps.iter().all(|step| step.result.is_ok()));
        assert_eq!(ctx.current_pid(), 0);
        let pte = ctx.entry(0).unwrap().unwrap();
        assert_eq!(pte.pfn, Some(0));
        assert!(pte.writable);
        assert_eq!(ctx.check_mapcounts(), Ok(()));
        fs::remove_file(TEST_SCRIPT).unwrap();
    }

    #[test]
    #[serial]
    fn replay_empty_script_file() {
        File::create(TEST_SCRIPT).unwrap();
        let script = fs::read_to_string(TEST_SCRIPT).unwrap();
        let mut ctx = Context::<4, 8>::init();
        assert_eq!(replay(&mut ctx, &script), Ok(vec![]));
        fs::remove_file(TEST_SCRIPT).unwrap();
    }
}
