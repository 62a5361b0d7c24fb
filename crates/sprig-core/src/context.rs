use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use crate::error::ProgramError;
use crate::node::Node;

pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Name a program can bind to replace standard input for `read`.
pub const STDIN_OVERRIDE: &str = "--stdin";

/// How a closure resolves names that are neither parameters nor captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scoping {
    /// Fall back to the global frame.
    #[default]
    Lexical,
    /// Fall back to the caller's whole chain.
    Dynamic,
}

impl fmt::Display for Scoping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scoping::Lexical => write!(f, "lexical"),
            Scoping::Dynamic => write!(f, "dynamic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub scoping: Scoping,
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scoping: Scoping::Lexical,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Counters collected while a program runs: evaluated node kinds or executed
/// opcodes, and user-defined function calls by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub forms: BTreeMap<&'static str, u64>,
    pub calls: BTreeMap<String, u64>,
}

impl Stats {
    pub fn record_form(&mut self, kind: &'static str) {
        *self.forms.entry(kind).or_insert(0) += 1;
    }

    pub fn record_call(&mut self, name: &str) {
        if let Some(count) = self.calls.get_mut(name) {
            *count += 1;
        } else {
            self.calls.insert(name.to_string(), 1);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty() && self.calls.is_empty()
    }
}

fn write_section<K: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    rows: &BTreeMap<K, u64>,
) -> fmt::Result {
    if rows.is_empty() {
        return Ok(());
    }
    writeln!(f, "{title}")?;
    writeln!(f, "{}", "-".repeat(title.len()))?;
    let width = rows.keys().map(|k| k.to_string().len()).max().unwrap_or(0);
    for (key, count) in rows {
        writeln!(f, "\t{:<width$} = {count}", key.to_string())?;
    }
    Ok(())
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, "Function Calls", &self.forms)?;
        write_section(f, "User Defined Function Calls", &self.calls)
    }
}

/// Turns source text into a node. Installed by whoever links a reader in.
pub type ReaderFn = fn(&str) -> Result<Node, ProgramError>;

/// An in-memory `Write` sink whose contents stay readable after it has been
/// handed to a context.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        SharedBuffer::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// All mutable state of one evaluation: configuration, the recursion depth
/// counter, statistics, and the I/O streams `print` and `read` use.
pub struct EvalContext {
    pub config: Config,
    pub depth: Cell<usize>,
    pub stats: RefCell<Stats>,
    pub collect_stats: Cell<bool>,
    output: RefCell<Box<dyn Write>>,
    input: RefCell<Box<dyn BufRead>>,
    reader: Cell<Option<ReaderFn>>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        EvalContext {
            config,
            depth: Cell::new(0),
            stats: RefCell::new(Stats::default()),
            collect_stats: Cell::new(false),
            output: RefCell::new(Box::new(io::stdout())),
            input: RefCell::new(Box::new(io::BufReader::new(io::stdin()))),
            reader: Cell::new(None),
        }
    }

    pub fn with_output(self, output: Box<dyn Write>) -> Self {
        *self.output.borrow_mut() = output;
        self
    }

    pub fn with_input(self, input: Box<dyn BufRead>) -> Self {
        *self.input.borrow_mut() = input;
        self
    }

    pub fn with_reader(self, reader: ReaderFn) -> Self {
        self.reader.set(Some(reader));
        self
    }

    pub fn set_reader(&self, reader: ReaderFn) {
        self.reader.set(Some(reader));
    }

    pub fn scoping(&self) -> Scoping {
        self.config.scoping
    }

    /// Enter one level of nesting. The returned guard leaves it on drop, so
    /// the counter is restored on every exit path including errors.
    pub fn enter(&self) -> Result<DepthGuard<'_>, ProgramError> {
        let depth = self.depth.get() + 1;
        if depth > self.config.max_depth {
            return Err(ProgramError::DepthExceeded(self.config.max_depth));
        }
        self.depth.set(depth);
        Ok(DepthGuard { ctx: self })
    }

    pub fn record_form(&self, kind: &'static str) {
        if self.collect_stats.get() {
            self.stats.borrow_mut().record_form(kind);
        }
    }

    pub fn record_call(&self, name: &str) {
        if self.collect_stats.get() {
            self.stats.borrow_mut().record_call(name);
        }
    }

    pub fn take_stats(&self) -> Stats {
        std::mem::take(&mut *self.stats.borrow_mut())
    }

    /// Write and flush.
    pub fn write_output(&self, text: &str) -> Result<(), ProgramError> {
        let mut out = self.output.borrow_mut();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// One line of input without its terminator; `None` at end of input.
    pub fn read_line(&self) -> Result<Option<String>, ProgramError> {
        let mut line = String::new();
        if self.input.borrow_mut().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    pub fn parse_source(&self, source: &str) -> Result<Node, ProgramError> {
        let reader = self
            .reader
            .get()
            .ok_or_else(|| ProgramError::eval("parse: no reader installed"))?;
        reader(source)
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`EvalContext::enter`].
pub struct DepthGuard<'a> {
    ctx: &'a EvalContext,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.ctx.depth.set(self.ctx.depth.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_guard_restores_on_drop() {
        let ctx = EvalContext::with_config(Config {
            max_depth: 2,
            ..Config::default()
        });
        {
            let _a = ctx.enter().unwrap();
            let _b = ctx.enter().unwrap();
            assert_eq!(ctx.depth.get(), 2);
            assert!(matches!(ctx.enter(), Err(ProgramError::DepthExceeded(2))));
        }
        assert_eq!(ctx.depth.get(), 0);
    }

    #[test]
    fn stats_only_recorded_when_enabled() {
        let ctx = EvalContext::new();
        ctx.record_form("Call");
        assert!(ctx.stats.borrow().is_empty());
        ctx.collect_stats.set(true);
        ctx.record_form("Call");
        ctx.record_form("Call");
        ctx.record_call("fact");
        let stats = ctx.take_stats();
        assert_eq!(stats.forms.get("Call"), Some(&2));
        assert_eq!(stats.calls.get("fact"), Some(&1));
        assert!(ctx.stats.borrow().is_empty());
    }

    #[test]
    fn stats_report_layout() {
        let mut stats = Stats::default();
        stats.record_form("Var");
        stats.record_form("Suite");
        stats.record_call("f");
        let text = stats.to_string();
        assert_eq!(
            text,
            "Function Calls\n--------------\n\tSuite = 1\n\tVar   = 1\n\
             User Defined Function Calls\n---------------------------\n\tf = 1\n"
        );
    }

    #[test]
    fn read_line_strips_terminator() {
        let input = io::Cursor::new("first\r\nsecond\nlast");
        let ctx = EvalContext::new().with_input(Box::new(input));
        assert_eq!(ctx.read_line().unwrap().as_deref(), Some("first"));
        assert_eq!(ctx.read_line().unwrap().as_deref(), Some("second"));
        assert_eq!(ctx.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(ctx.read_line().unwrap(), None);
    }

    #[test]
    fn output_goes_to_configured_sink() {
        let buf = SharedBuffer::new();
        let ctx = EvalContext::new().with_output(Box::new(buf.clone()));
        ctx.write_output("hello").unwrap();
        assert_eq!(buf.contents(), "hello");
    }
}
