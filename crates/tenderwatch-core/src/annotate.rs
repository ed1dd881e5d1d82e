//! Keyword annotation of complaint text.
//!
//! [`TextAnnotator`] is the seam the aggregator depends on. The bundled
//! [`LexiconAnnotator`] is dictionary based: it lowercases word tokens, maps
//! them through an optional form → lemma table and matches the result against
//! the per-domain keyword sets.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Result;

/// One keyword hit. `offset` and `length` count characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
  pub lemma:  String,
  pub domain: String,
  pub offset: usize,
  pub length: usize,
}

/// Text annotation service, built once and shared read-only.
pub trait TextAnnotator: Send + Sync {
  /// Every `(lemma, domain)` hit in `text`, one per token and domain.
  fn annotate(&self, text: &str) -> Vec<Annotation>;

  fn keyword_table(&self) -> &KeywordTable;
}

// ─── Keyword table ───────────────────────────────────────────────────────────

/// `domain -> set of lemmas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordTable {
  domains: BTreeMap<String, BTreeSet<String>>,
}

impl KeywordTable {
  /// Parse a JSON object mapping each domain to a list of keywords.
  pub fn from_json(raw: &str) -> Result<Self> {
    let domains: BTreeMap<String, Vec<String>> = serde_json::from_str(raw)?;
    Ok(domains.into_iter().collect())
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let raw = std::fs::read_to_string(path)?;
    Self::from_json(&raw)
  }

  pub fn is_empty(&self) -> bool {
    self.domains.values().all(BTreeSet::is_empty)
  }

  pub fn domains(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
    self.domains.iter().map(|(d, words)| (d.as_str(), words))
  }

  /// Re-key every keyword by its lemma.
  pub fn lemmatized(&self, lemmas: &Lemmatizer) -> Self {
    self
      .domains
      .iter()
      .map(|(domain, words)| (domain.clone(), words.iter().map(|w| lemmas.lemma(w))))
      .collect()
  }
}

impl<D, W, I> FromIterator<(D, I)> for KeywordTable
where
  D: Into<String>,
  W: Into<String>,
  I: IntoIterator<Item = W>,
{
  fn from_iter<T: IntoIterator<Item = (D, I)>>(iter: T) -> Self {
    let mut domains: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (domain, words) in iter {
      domains
        .entry(domain.into())
        .or_default()
        .extend(words.into_iter().map(|w| w.into().to_lowercase()));
    }
    Self { domains }
  }
}

// ─── Lemmatizer ──────────────────────────────────────────────────────────────

/// Word-form → lemma lookup. Unknown forms are their own lemma.
#[derive(Debug, Clone, Default)]
pub struct Lemmatizer {
  forms: HashMap<String, String>,
}

impl Lemmatizer {
  /// Parse a JSON object mapping word forms to lemmas.
  pub fn from_json(raw: &str) -> Result<Self> {
    let forms: HashMap<String, String> = serde_json::from_str(raw)?;
    Ok(Self {
      forms: forms
        .into_iter()
        .map(|(form, lemma)| (form.to_lowercase(), lemma.to_lowercase()))
        .collect(),
    })
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let raw = std::fs::read_to_string(path)?;
    Self::from_json(&raw)
  }

  pub fn lemma(&self, word: &str) -> String {
    let lower = word.to_lowercase();
    self.forms.get(&lower).cloned().unwrap_or(lower)
  }
}

// ─── LexiconAnnotator ────────────────────────────────────────────────────────

pub struct LexiconAnnotator {
  keywords:  KeywordTable,
  lemmas:    Lemmatizer,
  by_lemma:  HashMap<String, Vec<String>>,
}

impl LexiconAnnotator {
  pub fn new(keywords: KeywordTable, lemmas: Lemmatizer) -> Self {
    let keywords = keywords.lemmatized(&lemmas);

    let mut by_lemma: HashMap<String, Vec<String>> = HashMap::new();
    for (domain, words) in keywords.domains() {
      for word in words {
        by_lemma.entry(word.clone()).or_default().push(domain.to_owned());
      }
    }

    Self { keywords, lemmas, by_lemma }
  }

  /// Load the keyword table and, if given, a lemma dictionary.
  pub fn load(keywords_path: &Path, lemmas_path: Option<&Path>) -> Result<Self> {
    let keywords = KeywordTable::load(keywords_path)?;
    let lemmas = match lemmas_path {
      Some(path) => Lemmatizer::load(path)?,
      None => Lemmatizer::default(),
    };
    info!(
      path = %keywords_path.display(),
      domains = keywords.domains().count(),
      "loaded keyword table"
    );
    Ok(Self::new(keywords, lemmas))
  }
}

impl TextAnnotator for LexiconAnnotator {
  fn annotate(&self, text: &str) -> Vec<Annotation> {
    let mut out = Vec::new();
    for (offset, token) in tokens(text) {
      let lemma = self.lemmas.lemma(&token);
      let Some(domains) = self.by_lemma.get(&lemma) else {
        continue;
      };
      let length = token.chars().count();
      for domain in domains {
        out.push(Annotation {
          lemma: lemma.clone(),
          domain: domain.clone(),
          offset,
          length,
        });
      }
    }
    out
  }

  fn keyword_table(&self) -> &KeywordTable {
    &self.keywords
  }
}

fn is_apostrophe(c: char) -> bool {
  matches!(c, '\'' | '’' | 'ʼ')
}

/// Split into word tokens, returning each token's character offset.
///
/// A word is a run of alphanumerics; an apostrophe between two alphanumerics
/// stays inside the word.
fn tokens(text: &str) -> Vec<(usize, String)> {
  let chars: Vec<char> = text.chars().collect();
  let mut out = Vec::new();
  let mut i = 0;

  while i < chars.len() {
    if !chars[i].is_alphanumeric() {
      i += 1;
      continue;
    }
    let start = i;
    while i < chars.len() {
      let c = chars[i];
      let joins = is_apostrophe(c)
        && i + 1 < chars.len()
        && chars[i + 1].is_alphanumeric()
        && i > start;
      if c.is_alphanumeric() || joins {
        i += 1;
      } else {
        break;
      }
    }
    out.push((start, chars[start..i].iter().collect()));
  }

  out
}
