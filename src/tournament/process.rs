//! Scoped acquisition of an engine child process with line-oriented text
//! pipes.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{bail, Context};

/// A spawned engine process with piped stdin/stdout. The pipes are owned
/// exclusively by one worker and never shared. Dropping the process closes
/// both pipe ends and terminates the child.
pub struct EngineProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    line: String,
}

impl EngineProcess {
    /// Spawns `cmd`, a command line with backslash-escaped spaces. A
    /// path-qualified command ("../engines/demolito") runs from its own
    /// directory, so engines find their nets and books next to the binary.
    pub fn spawn(cmd: &str) -> anyhow::Result<Self> {
        let mut tokens = split_escaped(cmd);
        if tokens.is_empty() {
            bail!("missing command to start engine");
        }
        let program = tokens.remove(0);

        let mut command = match program.rfind('/') {
            Some(slash) => {
                let (dir, file) = program.split_at(slash);
                let mut command = Command::new(format!("./{}", &file[1..]));
                let _ = command.current_dir(if dir.is_empty() { "/" } else { dir });
                command
            }
            None => Command::new(&program),
        };

        let mut child = command
            .args(&tokens)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("can not start engine '{cmd}'"))?;
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = BufReader::new(child.stdout.take().expect("stdout was piped"));

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout,
            line: String::new(),
        })
    }

    /// Reads one line from the engine, with the trailing newline stripped.
    /// EOF means the engine died, which is fatal to the worker.
    pub fn read_line(&mut self) -> anyhow::Result<&str> {
        self.line.clear();
        let bytes = self
            .stdout
            .read_line(&mut self.line)
            .context("engine read failed")?;
        if bytes == 0 {
            bail!("engine closed its side of the pipe");
        }
        Ok(self.line.trim_end_matches(['\r', '\n']))
    }

    /// Writes one line to the engine and flushes immediately; the engine side
    /// of the dialogue must never sit in a buffer.
    pub fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        let stdin = self.stdin.as_mut().expect("stdin open until drop");
        writeln!(stdin, "{line}").context("engine write failed")?;
        stdin.flush().context("engine flush failed")
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        // Closing stdin is the polite termination request: engines exit on
        // EOF (or on the "quit" the session already sent). The kill is the
        // backstop for the ones that do not.
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Splits a command line on spaces, with backslash escaping the next
/// character (the only quoting mechanism; file names may contain spaces).
fn split_escaped(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ' ' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::split_escaped;

    #[test]
    fn splits_on_spaces() {
        assert_eq!(
            split_escaped("./stockfish bench 16"),
            vec!["./stockfish", "bench", "16"]
        );
    }

    #[test]
    fn backslash_escapes_spaces() {
        assert_eq!(
            split_escaped(r"engines/my\ engine --uci"),
            vec!["engines/my engine", "--uci"]
        );
    }

    #[test]
    fn collapses_runs_of_spaces() {
        assert_eq!(split_escaped("a   b"), vec!["a", "b"]);
        assert_eq!(split_escaped(""), Vec::<String>::new());
    }
}
