//! Interactive secret input
//!
//! A session walks through `Collecting → Reviewing → (RedoOne → Reviewing)*
//! → Confirmed`. Entries are never edited in place: a redo builds a new
//! [`SecretSession`] with one entry replaced.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::manifest::validate_name;

/// Moves the cursor home and clears the terminal
pub const ANSI_ESCAPE_CLEAR: &str = "\x1b[H\x1b[2J";

const RULE_WIDTH: usize = 80;

/// What a single entered value resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretValue {
    /// Left blank: the existing ciphertext is kept as is
    Unchanged,
    /// Used literally (trimmed)
    Literal(String),
    /// The raw value named a readable file; holds its contents
    File(Vec<u8>),
}

/// One key and the value the user gave for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEntry {
    pub key: String,
    /// Text as entered, trimmed
    pub raw_value: String,
    pub value: SecretValue,
}

impl SecretEntry {
    /// An entry nobody has typed anything for yet
    pub fn blank(key: &str) -> Self {
        Self {
            key: key.to_string(),
            raw_value: String::new(),
            value: SecretValue::Unchanged,
        }
    }

    /// Classify `raw` for `key`: blank, path to a readable file, or literal.
    /// Whitespace-only input counts as blank.
    pub fn classify(key: &str, raw: &str) -> Self {
        let raw_value = raw.trim().to_string();
        let value = if raw_value.is_empty() {
            SecretValue::Unchanged
        } else {
            match read_regular_file(Path::new(&raw_value)) {
                Some(contents) => SecretValue::File(contents),
                None => SecretValue::Literal(raw_value.clone()),
            }
        };

        Self {
            key: key.to_string(),
            raw_value,
            value,
        }
    }

    /// The bytes to seal, or `None` when the entry was left blank
    pub fn resolved(&self) -> Option<&[u8]> {
        match &self.value {
            SecretValue::Unchanged => None,
            SecretValue::Literal(s) => Some(s.as_bytes()),
            SecretValue::File(contents) => Some(contents),
        }
    }

    /// Review line, without the index prefix
    pub fn describe(&self) -> String {
        match &self.value {
            SecretValue::File(_) => format!(
                "{} will contain the contents of file {}",
                self.key, self.raw_value
            ),
            SecretValue::Unchanged => format!("{} will remain unchanged", self.key),
            SecretValue::Literal(value) => format!("{}={}", self.key, value),
        }
    }
}

fn read_regular_file(path: &Path) -> Option<Vec<u8>> {
    let is_file = fs::metadata(path).map(|m| m.is_file()).unwrap_or(false);
    if !is_file {
        return None;
    }
    fs::read(path).ok()
}

/// Ordered entries, addressed 1-based in everything shown to the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretSession {
    entries: Vec<SecretEntry>,
}

impl SecretSession {
    /// One blank entry per key, in the order given
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: keys
                .into_iter()
                .map(|k| SecretEntry::blank(k.as_ref()))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[SecretEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SecretEntry> {
        index.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// A copy of this session with entry `index` (1-based) replaced
    pub fn with_entry(&self, index: usize, entry: SecretEntry) -> Result<Self> {
        if index == 0 || index > self.entries.len() {
            return Err(Error::Input(format!(
                "secret number {} out of range 1-{}",
                index,
                self.entries.len()
            )));
        }
        let mut entries = self.entries.clone();
        entries[index - 1] = entry;
        Ok(Self { entries })
    }

    /// A copy of this session with `entry` appended
    pub fn with_appended(&self, entry: SecretEntry) -> Self {
        let mut entries = self.entries.clone();
        entries.push(entry);
        Self { entries }
    }

    /// Key to value for everything that needs sealing. Blank entries are
    /// left out so their ciphertext is carried over untouched.
    pub fn finalize(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries
            .iter()
            .filter_map(|e| e.resolved().map(|v| (e.key.clone(), v.to_vec())))
            .collect()
    }
}

/// Where the session is in the collect/review loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Prompting for every entry, or only for the 1-based index given
    Collecting(Option<usize>),
    Reviewing,
    Confirmed,
}

/// Result of one review prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Confirmed,
    Redo(usize),
}

/// Line-oriented prompt over any input/output pair
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the output stream (tests inspect it)
    pub fn into_output(self) -> W {
        self.output
    }

    /// Drive `session` from the initial full collect to confirmation.
    /// A blank value keeps the existing ciphertext.
    pub fn run(&mut self, session: SecretSession) -> Result<SecretSession> {
        self.drive(session, SessionState::Collecting(None), false)
    }

    /// Review already-collected entries until confirmed.
    ///
    /// There is no existing ciphertext to keep, so a redo re-prompts until
    /// a value is given.
    pub fn confirm(&mut self, session: SecretSession) -> Result<SecretSession> {
        self.drive(session, SessionState::Reviewing, true)
    }

    fn drive(
        &mut self,
        mut session: SecretSession,
        mut state: SessionState,
        require_value: bool,
    ) -> Result<SecretSession> {
        loop {
            debug!(?state, entries = session.len(), "secret session step");
            state = match state {
                SessionState::Collecting(target) => {
                    session = self.collect(&session, target, require_value)?;
                    SessionState::Reviewing
                }
                SessionState::Reviewing => match self.review(&session)? {
                    ReviewOutcome::Confirmed => SessionState::Confirmed,
                    ReviewOutcome::Redo(index) => SessionState::Collecting(Some(index)),
                },
                SessionState::Confirmed => return Ok(session),
            };
        }
    }

    /// Prompt `KEY=` for every entry, or only entry `target` (1-based)
    fn collect(
        &mut self,
        session: &SecretSession,
        target: Option<usize>,
        require_value: bool,
    ) -> Result<SecretSession> {
        self.header("Please enter your secrets for each key then press enter:")?;

        let mut next = session.clone();
        for (i, entry) in session.entries().iter().enumerate() {
            let index = i + 1;
            if target.is_some_and(|t| t != index) {
                continue;
            }
            let entered = loop {
                self.write(&format!("{}=", entry.key))?;
                let line = self.read_line()?;
                let entered = SecretEntry::classify(&entry.key, &line);
                if require_value && entered.value == SecretValue::Unchanged {
                    self.write(&format!(
                        "WARNING: A new secret needs a value, please re-enter {}.\n",
                        entry.key
                    ))?;
                    continue;
                }
                break entered;
            };
            next = next.with_entry(index, entered)?;
        }
        Ok(next)
    }

    /// Show every entry, then ask for `Y` or an entry number to redo
    pub fn review(&mut self, session: &SecretSession) -> Result<ReviewOutcome> {
        self.header("Please review each secret is correct:")?;
        for (i, entry) in session.entries().iter().enumerate() {
            self.write(&format!("{}. {}\n", i + 1, entry.describe()))?;
        }

        let range = if session.len() == 1 {
            "1".to_string()
        } else {
            format!("1-{}", session.len())
        };
        let outcome = loop {
            self.write(&format!(
                "\nEnter the secret number to change the value, or Y to confirm\n{} or Y: ",
                range
            ))?;
            let line = self.read_line()?;
            let answer = line.trim();
            if answer == "Y" {
                break ReviewOutcome::Confirmed;
            }
            match answer.parse::<usize>() {
                Ok(n) if n >= 1 && n <= session.len() => break ReviewOutcome::Redo(n),
                _ => self.write("ERROR: Input invalid, please retry.\n")?,
            }
        };
        self.write(ANSI_ESCAPE_CLEAR)?;
        Ok(outcome)
    }

    /// Ask which namespace a new SealedSecret is scoped to
    pub fn namespace(&mut self) -> Result<String> {
        self.header("What namespace will this Sealed Secret be scoped to?:")?;
        loop {
            self.write("namespace=")?;
            let line = self.read_line()?;
            let namespace = line.trim();
            if namespace.is_empty() {
                self.write("WARNING: Invalid namespace values are ignored, please re-enter a namespace.\n")?;
                continue;
            }
            if let Err(e) = validate_name(namespace) {
                self.write(&format!("WARNING: {}\n", e))?;
                continue;
            }
            return Ok(namespace.to_string());
        }
    }

    /// Read `KEY=VALUE` lines until a blank line
    pub fn enter(&mut self) -> Result<SecretSession> {
        self.header("Enter a key and value separated by =, leave blank and press enter when finished:")?;

        let mut session = SecretSession::default();
        loop {
            let line = self.read_line()?;
            if line.trim().is_empty() {
                break;
            }
            let Some((key, value)) = line.split_once('=') else {
                self.write("WARNING: Lines not containing key and value separated by '=' are ignored\n")?;
                continue;
            };
            let key = key.trim();
            if key.is_empty() || value.trim().is_empty() {
                self.write("WARNING: Lines not containing key and value separated by '=' are ignored\n")?;
                continue;
            }
            if session.contains_key(key) {
                self.write(&format!(
                    "WARNING: Key '{}' was already entered, change it when reviewing\n",
                    key
                ))?;
                continue;
            }
            session = session.with_appended(SecretEntry::classify(key, value));
        }
        Ok(session)
    }

    fn header(&mut self, title: &str) -> Result<()> {
        self.write(&format!(
            "{}{}\n\n{}\n",
            ANSI_ESCAPE_CLEAR,
            "-".repeat(RULE_WIDTH),
            title
        ))
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush())
            .map_err(|e| Error::Input(format!("cannot write prompt: {}", e)))
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .map_err(|e| Error::Input(format!("cannot read input: {}", e)))?;
        if n == 0 {
            return Err(Error::Input("unexpected end of input".to_string()));
        }
        let trimmed = line.strip_suffix('\n').unwrap_or(&line);
        let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn prompt(input: &str) -> Prompt<Cursor<Vec<u8>>, Vec<u8>> {
        Prompt::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn output(p: Prompt<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(p.into_output()).unwrap()
    }

    #[test]
    fn test_single_key_confirmed() {
        let mut p = prompt("test\nY\n");
        let session = p.run(SecretSession::new(["SECRET1"])).unwrap();
        let values = session.finalize();
        assert_eq!(values.get("SECRET1").map(Vec::as_slice), Some(&b"test"[..]));

        let out = output(p);
        assert!(out.contains("SECRET1="));
        assert!(out.contains("1. SECRET1=test"));
        assert!(out.contains("1 or Y: "));
    }

    #[test]
    fn test_classification() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cert.pem");
        std::fs::write(&file, b"file-contents").unwrap();

        let blank = SecretEntry::classify("A", "   ");
        assert_eq!(blank.value, SecretValue::Unchanged);
        assert_eq!(blank.resolved(), None);

        let literal = SecretEntry::classify("B", "  hello world  ");
        assert_eq!(literal.value, SecretValue::Literal("hello world".to_string()));
        assert_eq!(literal.raw_value, "hello world");

        let from_file = SecretEntry::classify("C", file.to_str().unwrap());
        assert_eq!(from_file.value, SecretValue::File(b"file-contents".to_vec()));

        // A directory is not a readable file
        let dir_entry = SecretEntry::classify("D", dir.path().to_str().unwrap());
        assert!(matches!(dir_entry.value, SecretValue::Literal(_)));
    }

    #[test]
    fn test_review_lines() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("key.txt");
        std::fs::write(&file, b"k").unwrap();
        let path = file.to_str().unwrap().to_string();

        let input = format!("{}\n\nvalue\nY\n", path);
        let mut p = prompt(&input);
        let session = p.run(SecretSession::new(["FILE", "KEEP", "STR"])).unwrap();
        assert_eq!(session.len(), 3);

        let out = output(p);
        assert!(out.contains(&format!("1. FILE will contain the contents of file {}", path)));
        assert!(out.contains("2. KEEP will remain unchanged"));
        assert!(out.contains("3. STR=value"));
        assert!(out.contains("1-3 or Y: "));
    }

    #[test]
    fn test_redo_single_entry() {
        // Initial pass, redo #2, then confirm
        let mut p = prompt("one\ntwo\n2\nTWO\nY\n");
        let session = p.run(SecretSession::new(["A", "B"])).unwrap();
        let values = session.finalize();
        assert_eq!(values["A"], b"one");
        assert_eq!(values["B"], b"TWO");

        // Only B was prompted for on the redo pass
        let out = output(p);
        let collect_passes: Vec<&str> = out
            .split("Please enter your secrets for each key then press enter:\n")
            .skip(1)
            .map(|pass| pass.split(ANSI_ESCAPE_CLEAR).next().unwrap_or(""))
            .collect();
        assert_eq!(collect_passes, vec!["A=B=", "B="]);
    }

    #[test]
    fn test_redo_to_blank_keeps_unchanged() {
        let mut p = prompt("one\n1\n\nY\n");
        let session = p.run(SecretSession::new(["A"])).unwrap();
        assert_eq!(session.get(1).unwrap().value, SecretValue::Unchanged);
        assert!(session.finalize().is_empty());
    }

    #[test]
    fn test_invalid_review_input_retries() {
        let mut p = prompt("x\n\n0\n3\ny\nabc\nY\n");
        let session = p.run(SecretSession::new(["A", "B"])).unwrap();
        assert_eq!(session.finalize().len(), 1);

        let out = output(p);
        assert_eq!(out.matches("ERROR: Input invalid, please retry.").count(), 4);
    }

    #[test]
    fn test_all_blank_finalizes_empty() {
        let mut p = prompt("\n\n\nY\n");
        let session = p.run(SecretSession::new(["A", "B", "C"])).unwrap();
        assert!(session.finalize().is_empty());
    }

    #[test]
    fn test_eof_is_input_error() {
        let mut p = prompt("value\n");
        let err = p.run(SecretSession::new(["A"])).unwrap_err();
        assert!(matches!(err, Error::Input(_)));

        let mut p = prompt("");
        assert!(matches!(
            p.run(SecretSession::new(["A"])),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn test_never_confirming_exhausts_input() {
        let mut p = prompt("a\n1\nb\n1\nc\n");
        assert!(matches!(
            p.run(SecretSession::new(["A"])),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn test_with_entry_is_pure() {
        let original = SecretSession::new(["A", "B"]);
        let updated = original
            .with_entry(2, SecretEntry::classify("B", "x"))
            .unwrap();
        assert_eq!(original.get(2).unwrap().value, SecretValue::Unchanged);
        assert_eq!(
            updated.get(2).unwrap().value,
            SecretValue::Literal("x".to_string())
        );
        assert!(original.with_entry(0, SecretEntry::blank("A")).is_err());
        assert!(original.with_entry(3, SecretEntry::blank("A")).is_err());
    }

    #[test]
    fn test_confirm_redo_requires_a_value() {
        let mut p = prompt("A=1\nB=2\n\n2\n\n  \nthree\nY\n");
        let session = p.enter().unwrap();
        let session = p.confirm(session).unwrap();
        let values = session.finalize();
        assert_eq!(values.len(), 2);
        assert_eq!(values["B"], b"three");

        let out = output(p);
        assert_eq!(
            out.matches("WARNING: A new secret needs a value, please re-enter B.")
                .count(),
            2
        );
        assert!(!out.contains("will remain unchanged"));
    }

    #[test]
    fn test_crlf_input() {
        let mut p = prompt("secret\r\nY\r\n");
        let session = p.run(SecretSession::new(["A"])).unwrap();
        assert_eq!(session.finalize()["A"], b"secret");
    }

    #[test]
    fn test_namespace_retries_blank_and_invalid() {
        let mut p = prompt("\nBad_NS\nexample\n");
        assert_eq!(p.namespace().unwrap(), "example");
        let out = output(p);
        assert!(out.contains("WARNING: Invalid namespace values are ignored"));
        assert_eq!(out.matches("namespace=").count(), 3);
    }

    #[test]
    fn test_enter_pairs() {
        let mut p = prompt("A=1\nnovalue\n=2\nB= two \nA=again\n\n");
        let session = p.enter().unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session.get(1).unwrap().key, "A");
        assert_eq!(session.get(2).unwrap().key, "B");
        assert_eq!(session.finalize()["B"], b"two");

        let out = output(p);
        assert_eq!(
            out.matches("WARNING: Lines not containing key and value").count(),
            2
        );
        assert!(out.contains("WARNING: Key 'A' was already entered"));
    }

    #[test]
    fn test_enter_then_confirm() {
        let mut p = prompt("A=1\n\n1\n2\nY\n");
        let session = p.enter().unwrap();
        let session = p.confirm(session).unwrap();
        assert_eq!(session.finalize()["A"], b"2");
    }
}
