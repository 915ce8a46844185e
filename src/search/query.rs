use std::collections::HashSet;

use tantivy::query::{BooleanQuery, EmptyQuery, Occur, Query, TermQuery};
use tantivy::schema::{FieldType, Term};
use tantivy::tokenizer::TokenStream;

use crate::error::{EngineError, EngineResult};
use crate::search::cache::SearcherSnapshot;
use crate::search::canonicalize::{canonical_field_names, normalize_query_text};

/// How field clauses combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    /// Every field must contain every query term.
    All,
    /// Any query term in any field is enough.
    #[default]
    Any,
}

impl Combine {
    fn occur(self) -> Occur {
        match self {
            Combine::All => Occur::Must,
            Combine::Any => Occur::Should,
        }
    }
}

/// A normalized query, independent of any particular index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredQuery {
    text: String,
    fields: Vec<String>,
    combine: Combine,
}

/// Normalize `raw` and `fields` into a [`StructuredQuery`].
///
/// Fails with [`EngineError::QueryParse`] when the text is only punctuation
/// and whitespace, or when no usable field name remains.
pub fn build<S: AsRef<str>>(raw: &str, fields: &[S], combine: Combine) -> EngineResult<StructuredQuery> {
    let text = normalize_query_text(raw);
    if text.is_empty() {
        return Err(EngineError::QueryParse(
            "query is empty after removing punctuation".into(),
        ));
    }
    let fields = canonical_field_names(fields);
    if fields.is_empty() {
        return Err(EngineError::QueryParse("no fields to search".into()));
    }
    Ok(StructuredQuery {
        text,
        fields,
        combine,
    })
}

impl StructuredQuery {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn combine(&self) -> Combine {
        self.combine
    }

    /// Lower to a tantivy query against the snapshot's schema.
    ///
    /// The text is run through each field's own analyzer and the resulting
    /// terms become term clauses, so nothing in the user's text is ever read
    /// as query syntax.
    pub fn lower(&self, snapshot: &SearcherSnapshot) -> EngineResult<Box<dyn Query>> {
        let schema = snapshot.schema();
        let occur = self.combine.occur();
        let mut field_clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(self.fields.len());

        for name in &self.fields {
            let field = schema
                .get_field(name)
                .map_err(|_| EngineError::QueryParse(format!("unknown field {name:?}")))?;
            let entry = schema.get_field_entry(field);
            let record_option = match entry.field_type() {
                FieldType::Str(opts) => match opts.get_indexing_options() {
                    Some(indexing) => indexing.index_option(),
                    None => {
                        return Err(EngineError::QueryParse(format!(
                            "field {name:?} is not indexed"
                        )));
                    }
                },
                _ => {
                    return Err(EngineError::QueryParse(format!(
                        "field {name:?} is not a text field"
                    )));
                }
            };

            let mut analyzer = snapshot
                .index()
                .tokenizer_for_field(field)
                .map_err(|e| EngineError::QueryParse(e.to_string()))?;
            let mut seen = HashSet::new();
            let mut terms: Vec<(Occur, Box<dyn Query>)> = Vec::new();
            let mut stream = analyzer.token_stream(&self.text);
            while stream.advance() {
                let token = stream.token().text.clone();
                if seen.insert(token.clone()) {
                    let term = Term::from_field_text(field, &token);
                    terms.push((occur, Box::new(TermQuery::new(term, record_option))));
                }
            }

            if terms.is_empty() {
                continue;
            }
            let clause: Box<dyn Query> = if terms.len() == 1 {
                terms.remove(0).1
            } else {
                Box::new(BooleanQuery::new(terms))
            };
            field_clauses.push((occur, clause));
        }

        if field_clauses.is_empty() {
            return Err(EngineError::QueryParse(format!(
                "query {:?} produced no searchable terms",
                self.text
            )));
        }
        if self.combine == Combine::All && field_clauses.len() < self.fields.len() {
            // A field that analyzes the text to nothing can never be satisfied.
            return Ok(Box::new(EmptyQuery));
        }
        Ok(Box::new(BooleanQuery::new(field_clauses)))
    }
}
