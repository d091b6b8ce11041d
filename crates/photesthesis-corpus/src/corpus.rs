//! The on-disk corpus: transcripts grouped by test name, serialized in a
//! canonical human-readable form.

use crate::plan::{Plan, PlanHash};
use crate::transcript::{Transcript, VarKind};
use crate::{ParamName, Params, TestName};
use photesthesis_value::{ParseError, Scanner, Symbol};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Corpus-level errors: I/O and parsing carry the file path, parsing also
/// carries the byte offset where reading stopped.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("i/o error on corpus file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing corpus file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("corpus file {path} at offset {offset}: expected {expected}, got `{found}`")]
    UnexpectedToken {
        path: PathBuf,
        offset: usize,
        expected: &'static str,
        found: String,
    },

    #[error(
        "corpus file {path} at offset {offset}: recorded plan hash {recorded} \
         does not match recomputed hash {computed}"
    )]
    HashMismatch {
        path: PathBuf,
        offset: usize,
        recorded: PlanHash,
        computed: PlanHash,
    },

    #[error("duplicate transcript for plan {plan} in test {test}")]
    DuplicatePlan { test: TestName, plan: PlanHash },

    #[error("no transcript with plan {plan} to update in test {test}")]
    MissingPlan { test: TestName, plan: PlanHash },

    #[error("parameter {param} is not a rule application")]
    ParamNotRuleApplication { param: ParamName },
}

/// The persisted set of transcripts, indexed by test name. Within a test,
/// transcripts are kept in their total order, which is also the order they
/// appear in the file.
pub struct Corpus {
    path: Option<PathBuf>,
    save_on_drop: bool,
    dirty: bool,
    transcripts: BTreeMap<TestName, BTreeSet<Transcript>>,
}

impl Corpus {
    /// An in-memory corpus with no backing file. Never written anywhere.
    pub fn new() -> Self {
        Corpus {
            path: None,
            save_on_drop: false,
            dirty: false,
            transcripts: BTreeMap::new(),
        }
    }

    /// Open the corpus backed by `path`, parsing it if it exists. A missing
    /// file yields an empty corpus. The corpus is rewritten on drop if it
    /// was modified.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CorpusError> {
        let path = path.into();
        let mut corpus = Corpus {
            path: Some(path.clone()),
            save_on_drop: true,
            dirty: false,
            transcripts: BTreeMap::new(),
        };
        match fs::read_to_string(&path) {
            Ok(src) => corpus.parse_into(&src)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "corpus file not found, starting empty");
            }
            Err(source) => return Err(CorpusError::Io { path, source }),
        }
        corpus.dirty = false;
        Ok(corpus)
    }

    /// Enable or disable the save-on-drop behavior.
    pub fn set_save_on_drop(&mut self, save: bool) {
        self.save_on_drop = save;
    }

    fn err_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_default()
    }

    fn parse_into(&mut self, src: &str) -> Result<(), CorpusError> {
        let path = self.err_path();
        let mut scanner = Scanner::new(src);
        loop {
            scanner.skip_whitespace();
            if scanner.at_end() {
                break;
            }
            let transcript = parse_transcript(&mut scanner, &path)?;
            self.add_transcript(transcript)?;
        }
        Ok(())
    }

    /// Iterate the stored transcripts for one test, in order.
    pub fn transcripts(&self, test: &TestName) -> impl Iterator<Item = &Transcript> {
        self.transcripts.get(test).into_iter().flatten()
    }

    pub fn transcript_count(&self, test: &TestName) -> usize {
        self.transcripts.get(test).map_or(0, BTreeSet::len)
    }

    pub fn has_transcripts(&self, test: &TestName) -> bool {
        self.transcript_count(test) > 0
    }

    pub fn contains(&self, transcript: &Transcript) -> bool {
        self.transcripts
            .get(transcript.test_name())
            .is_some_and(|set| set.contains(transcript))
    }

    /// Insert a transcript whose plan is new for its test.
    pub fn add_transcript(&mut self, transcript: Transcript) -> Result<(), CorpusError> {
        let test = transcript.test_name().clone();
        let set = self.transcripts.entry(test.clone()).or_default();
        if set.iter().any(|ts| ts.plan() == transcript.plan()) {
            return Err(CorpusError::DuplicatePlan {
                test,
                plan: transcript.plan().hash(),
            });
        }
        set.insert(transcript);
        self.mark_dirty();
        Ok(())
    }

    /// Replace the stored transcript whose plan equals the given one.
    pub fn update_transcript(&mut self, transcript: Transcript) -> Result<(), CorpusError> {
        let test = transcript.test_name().clone();
        let set = self.transcripts.entry(test.clone()).or_default();
        let old = set
            .iter()
            .find(|ts| ts.plan() == transcript.plan())
            .cloned()
            .ok_or_else(|| CorpusError::MissingPlan {
                test: test.clone(),
                plan: transcript.plan().hash(),
            })?;
        set.remove(&old);
        set.insert(transcript);
        self.mark_dirty();
        Ok(())
    }

    /// Idempotent: flag the corpus as needing a rewrite.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The whole corpus in canonical form: transcripts grouped by test name,
    /// sorted within a test, blocks separated by blank lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for set in self.transcripts.values() {
            for transcript in set {
                let _ = writeln!(out, "{}", transcript);
            }
        }
        out
    }

    /// Rewrite the backing file in canonical form (truncate + write) if the
    /// corpus is dirty. A corpus with no backing file is never written.
    pub fn save(&mut self) -> Result<(), CorpusError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        fs::write(&path, self.render()).map_err(|source| CorpusError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "corpus saved");
        self.dirty = false;
        Ok(())
    }
}

impl Default for Corpus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Corpus {
    fn drop(&mut self) {
        if self.save_on_drop && self.dirty {
            if let Err(e) = self.save() {
                error!("failed to save corpus on drop: {e}");
            }
        }
    }
}

fn expect_token<'a>(
    scanner: &mut Scanner<'a>,
    path: &Path,
    expected: &'static str,
) -> Result<&'a str, CorpusError> {
    scanner.skip_whitespace();
    let offset = scanner.pos();
    match scanner.next_token() {
        Some(token) if token == expected => Ok(token),
        Some(token) => Err(CorpusError::UnexpectedToken {
            path: path.to_path_buf(),
            offset,
            expected,
            found: token.to_string(),
        }),
        None => Err(CorpusError::UnexpectedToken {
            path: path.to_path_buf(),
            offset,
            expected,
            found: "<eof>".to_string(),
        }),
    }
}

fn symbol_token(
    scanner: &mut Scanner<'_>,
    path: &Path,
    expected: &'static str,
) -> Result<Symbol, CorpusError> {
    scanner.skip_whitespace();
    let offset = scanner.pos();
    let Some(token) = scanner.next_token() else {
        return Err(CorpusError::UnexpectedToken {
            path: path.to_path_buf(),
            offset,
            expected,
            found: "<eof>".to_string(),
        });
    };
    if token.is_empty() {
        return Err(CorpusError::UnexpectedToken {
            path: path.to_path_buf(),
            offset,
            expected,
            found: token.to_string(),
        });
    }
    Symbol::new(token).map_err(|source| CorpusError::Parse {
        path: path.to_path_buf(),
        source: ParseError::InvalidSymbol { offset, source },
    })
}

/// Parse one `#### transcript:` block.
fn parse_transcript(scanner: &mut Scanner<'_>, path: &Path) -> Result<Transcript, CorpusError> {
    expect_token(scanner, path, "####")?;
    expect_token(scanner, path, "transcript:")?;
    let test_name = symbol_token(scanner, path, "a test name")?;

    scanner.skip_whitespace();
    let hash_offset = scanner.pos();
    let hash_token = scanner.next_token().unwrap_or("<eof>");
    let recorded: PlanHash =
        hash_token
            .parse()
            .map_err(|_| CorpusError::UnexpectedToken {
                path: path.to_path_buf(),
                offset: hash_offset,
                expected: "a 0x-prefixed plan hash",
                found: hash_token.to_string(),
            })?;

    let mut plan = Plan::new(test_name);

    // Comment lines. A `####` line starts the next block, not a comment.
    loop {
        scanner.skip_whitespace();
        if scanner.peek() == Some(b'#') && !scanner.starts_with("####") {
            scanner.bump();
            let line = scanner.rest_of_line().trim();
            if !line.is_empty() {
                plan.add_comment(line.to_string());
            }
        } else {
            break;
        }
    }

    // Parameter bindings.
    let mut params = Params::new();
    loop {
        scanner.skip_whitespace();
        if scanner.peek() != Some(b'p') {
            break;
        }
        expect_token(scanner, path, "param:")?;
        let name = symbol_token(scanner, path, "a parameter name")?;
        expect_token(scanner, path, "=")?;
        let value = scanner
            .parse_value()
            .map_err(|source| CorpusError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        params.insert(name, value);
    }
    for (name, value) in params {
        plan.add_param(name, value);
    }

    let computed = plan.hash();
    if computed != recorded {
        return Err(CorpusError::HashMismatch {
            path: path.to_path_buf(),
            offset: hash_offset,
            recorded,
            computed,
        });
    }

    // Observed variables, in recorded order.
    let mut transcript = Transcript::new(plan);
    loop {
        scanner.skip_whitespace();
        if !matches!(scanner.peek(), Some(b'c') | Some(b't')) {
            break;
        }
        let kw_offset = scanner.pos();
        let keyword = scanner.next_token().unwrap_or_default();
        let kind = match keyword {
            "check:" => VarKind::Checked,
            "track:" => VarKind::Tracked,
            other => {
                return Err(CorpusError::UnexpectedToken {
                    path: path.to_path_buf(),
                    offset: kw_offset,
                    expected: "`check:` or `track:`",
                    found: other.to_string(),
                })
            }
        };
        let name = symbol_token(scanner, path, "a variable name")?;
        expect_token(scanner, path, "=")?;
        let value = scanner
            .parse_value()
            .map_err(|source| CorpusError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        transcript.push_var(name, value, kind);
    }
    Ok(transcript)
}
