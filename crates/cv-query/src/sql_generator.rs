//! Template-based SQL generator (§4.11): never an LLM call. Each filter
//! field resolves to a clause builder from a fixed dictionary, producing a
//! parameterized statement with positional placeholders in bind order.

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

use crate::translator::{Filter, Operator, Translation};
use crate::QueryError;

/// LLM-suggested limits above this are clamped (§8 boundary behavior).
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Str(String),
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl SqlValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::I64(i))
                } else {
                    n.as_f64().map(Self::F64)
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    /// Direct column comparison (`ILIKE` for contains).
    DirectColumn(&'static str),
    /// Computed from `experience_history.duration` summed and divided by 12.
    ComputedExperienceYears,
    /// Computed from `date_of_birth`.
    Age,
    /// `EXISTS` subquery against a related table.
    Exists { table: &'static str, column: &'static str },
    /// `EXISTS` with a join to a taxonomy table, falling back to a direct
    /// substring match on the stored text column for `role`. `id_column` is
    /// the taxonomy-id column on `table`, which is not `taxonomy_id`
    /// everywhere -- `experience_history` names it `role_taxonomy_id`
    /// (`metadata_storage.rs`'s schema).
    TaxonomyJoined {
        table: &'static str,
        name_column: &'static str,
        id_column: &'static str,
        fallback_column: Option<&'static str>,
    },
}

static FIELD_DICTIONARY: Lazy<HashMap<&'static str, FieldKind>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("location", FieldKind::DirectColumn("location"));
    m.insert("nationality", FieldKind::DirectColumn("nationality"));
    m.insert("experience_years", FieldKind::ComputedExperienceYears);
    m.insert("age", FieldKind::Age);
    m.insert(
        "education_level",
        FieldKind::Exists { table: "education_history", column: "degree" },
    );
    m.insert("language", FieldKind::Exists { table: "language_proficiencies", column: "name" });
    m.insert(
        "driving_license",
        FieldKind::Exists { table: "driving_licenses", column: "category" },
    );
    m.insert(
        "skill",
        FieldKind::TaxonomyJoined {
            table: "skill_proficiencies",
            name_column: "name",
            id_column: "taxonomy_id",
            fallback_column: None,
        },
    );
    m.insert(
        "software",
        FieldKind::TaxonomyJoined {
            table: "software_proficiencies",
            name_column: "name",
            id_column: "taxonomy_id",
            fallback_column: None,
        },
    );
    m.insert(
        "certification",
        FieldKind::TaxonomyJoined {
            table: "certification_proficiencies",
            name_column: "name",
            id_column: "taxonomy_id",
            fallback_column: None,
        },
    );
    m.insert(
        "role",
        FieldKind::TaxonomyJoined {
            table: "experience_history",
            name_column: "title",
            id_column: "role_taxonomy_id",
            fallback_column: Some("title"),
        },
    );
    m
});

/// Education-level aliases expand to a set of matching degree values (§4.11).
fn education_level_alias(value: &str) -> Vec<String> {
    match value.to_lowercase().as_str() {
        "university" | "πανεπιστήμιο" => vec!["bachelor".into(), "master".into(), "doctorate".into()],
        "highschool" | "λύκειο" => vec!["highschool".into()],
        other => vec![other.to_string()],
    }
}

pub struct GeneratedSql {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub summary: String,
}

/// Generate the parameterized candidate-search statement for a translation
/// (§4.11). Always restricts to active candidates; default sort is
/// `updated_at DESC` when the translation specifies none.
pub fn generate_sql(translation: &Translation) -> Result<GeneratedSql, QueryError> {
    let mut where_clauses = vec!["c.is_active = true".to_string()];
    let mut params = Vec::new();
    let mut summary_parts = Vec::new();

    let mut sorted_fields: Vec<_> = translation.filters.iter().collect();
    sorted_fields.sort_by_key(|(field, _)| field.to_string());

    for (field, filter) in sorted_fields {
        let Some(kind) = FIELD_DICTIONARY.get(field.as_str()) else {
            continue;
        };
        let clause = build_clause(field, *kind, filter, &mut params)?;
        summary_parts.push(format!("{field} {:?} {}", filter.operator, filter.value));
        where_clauses.push(clause);
    }

    let sort = translation.sort.clone().unwrap_or_else(|| "c.updated_at DESC".to_string());
    let limit = translation.limit.min(MAX_LIMIT);

    let sql = format!(
        "SELECT c.id, c.full_name, c.email, c.location, c.updated_at \
         FROM candidates c WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
        where_clauses.join(" AND "),
        sort,
        limit,
        translation.offset
    );

    let summary = if summary_parts.is_empty() {
        "no structured filters".to_string()
    } else {
        summary_parts.join(", ")
    };

    Ok(GeneratedSql { sql, params, summary })
}

fn build_clause(
    field: &str,
    kind: FieldKind,
    filter: &Filter,
    params: &mut Vec<SqlValue>,
) -> Result<String, QueryError> {
    match kind {
        FieldKind::DirectColumn(column) => direct_column_clause(column, filter, params),
        FieldKind::ComputedExperienceYears => experience_years_clause(filter, params),
        FieldKind::Age => age_clause(filter, params),
        FieldKind::Exists { table, column } => exists_clause(table, column, filter, params),
        FieldKind::TaxonomyJoined { table, name_column, id_column, fallback_column } => {
            taxonomy_joined_clause(field, table, name_column, id_column, fallback_column, filter, params)
        }
    }
}

fn bind(params: &mut Vec<SqlValue>, value: SqlValue) -> usize {
    params.push(value);
    params.len()
}

fn direct_column_clause(column: &str, filter: &Filter, params: &mut Vec<SqlValue>) -> Result<String, QueryError> {
    let value = SqlValue::from_json(&filter.value)
        .ok_or_else(|| QueryError::Generation(format!("unsupported value for {column}")))?;
    match filter.operator {
        Operator::Contains => {
            let Value::String(s) = &filter.value else {
                return Err(QueryError::Generation(format!("{column} contains requires a string")));
            };
            let idx = bind(params, SqlValue::Str(format!("%{s}%")));
            Ok(format!("c.{column} ILIKE ${idx}"))
        }
        Operator::Eq => {
            let idx = bind(params, value);
            Ok(format!("c.{column} = ${idx}"))
        }
        other => Err(QueryError::Generation(format!("operator {other:?} unsupported for {column}"))),
    }
}

fn experience_years_clause(filter: &Filter, params: &mut Vec<SqlValue>) -> Result<String, QueryError> {
    let subquery = "(SELECT COALESCE(SUM(duration_months), 0) / 12.0 FROM experience_history WHERE candidate_id = c.id)";
    numeric_comparison_clause(subquery, filter, params)
}

fn age_clause(filter: &Filter, params: &mut Vec<SqlValue>) -> Result<String, QueryError> {
    let subquery = "DATE_PART('year', AGE(c.date_of_birth))";
    numeric_comparison_clause(subquery, filter, params)
}

fn numeric_comparison_clause(
    expr: &str,
    filter: &Filter,
    params: &mut Vec<SqlValue>,
) -> Result<String, QueryError> {
    match filter.operator {
        Operator::Between => {
            let Value::Array(bounds) = &filter.value else {
                return Err(QueryError::Generation("between requires a two-element array".into()));
            };
            let [lo, hi] = bounds.as_slice() else {
                return Err(QueryError::Generation("between requires exactly two bounds".into()));
            };
            let lo = SqlValue::from_json(lo).ok_or_else(|| QueryError::Generation("invalid lower bound".into()))?;
            let hi = SqlValue::from_json(hi).ok_or_else(|| QueryError::Generation("invalid upper bound".into()))?;
            let idx_lo = bind(params, lo);
            let idx_hi = bind(params, hi);
            Ok(format!("{expr} BETWEEN ${idx_lo} AND ${idx_hi}"))
        }
        op => {
            let operator = match op {
                Operator::Eq => "=",
                Operator::Gt => ">",
                Operator::Gte => ">=",
                Operator::Lt => "<",
                Operator::Lte => "<=",
                _ => return Err(QueryError::Generation(format!("operator {op:?} unsupported for {expr}"))),
            };
            let value = SqlValue::from_json(&filter.value)
                .ok_or_else(|| QueryError::Generation("invalid numeric value".into()))?;
            let idx = bind(params, value);
            Ok(format!("{expr} {operator} ${idx}"))
        }
    }
}

fn exists_clause(
    table: &str,
    column: &str,
    filter: &Filter,
    params: &mut Vec<SqlValue>,
) -> Result<String, QueryError> {
    let Value::String(raw) = &filter.value else {
        return Err(QueryError::Generation(format!("{table} exists filter requires a string")));
    };
    let candidates = if table == "education_history" {
        education_level_alias(raw)
    } else {
        vec![raw.clone()]
    };

    let mut placeholders = Vec::with_capacity(candidates.len());
    for value in candidates {
        let idx = bind(params, SqlValue::Str(value));
        placeholders.push(format!("${idx}"));
    }

    Ok(format!(
        "EXISTS (SELECT 1 FROM {table} t WHERE t.candidate_id = c.id AND t.{column}::text ILIKE ANY(ARRAY[{}]))",
        placeholders.join(", ")
    ))
}

fn taxonomy_joined_clause(
    field: &str,
    table: &str,
    name_column: &str,
    id_column: &str,
    fallback_column: Option<&str>,
    filter: &Filter,
    params: &mut Vec<SqlValue>,
) -> Result<String, QueryError> {
    let Value::String(term) = &filter.value else {
        return Err(QueryError::Generation(format!("{field} filter requires a string")));
    };
    let pattern = format!("%{term}%");
    let idx_name = bind(params, SqlValue::Str(pattern));

    let mut clause = format!(
        "EXISTS (SELECT 1 FROM {table} t WHERE t.candidate_id = c.id AND \
         (t.{name_column} ILIKE ${idx_name} OR t.{id_column} ILIKE ${idx_name})"
    );

    if let Some(fallback) = fallback_column {
        let _ = write!(clause, " OR t.{fallback} ILIKE ${idx_name}");
    }
    clause.push(')');
    Ok(clause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::{QueryType, Translation};
    use std::collections::HashMap;

    fn base_translation(filters: HashMap<String, Filter>) -> Translation {
        Translation {
            query_type: QueryType::Structured,
            confidence: 0.9,
            filters,
            sort: None,
            limit: 20,
            offset: 0,
            semantic_query: None,
            clarification_question: None,
            unknown_terms: Vec::new(),
            fallback_used: false,
        }
    }

    #[test]
    fn restricts_to_active_candidates_and_defaults_sort() {
        let t = base_translation(HashMap::new());
        let generated = generate_sql(&t).unwrap();
        assert!(generated.sql.contains("c.is_active = true"));
        assert!(generated.sql.contains("ORDER BY c.updated_at DESC"));
    }

    #[test]
    fn four_filters_produce_four_parameters() {
        let mut filters = HashMap::new();
        filters.insert("role".into(), Filter { operator: Operator::Contains, value: serde_json::json!("accountant") });
        filters.insert("software".into(), Filter { operator: Operator::Contains, value: serde_json::json!("softone") });
        filters.insert(
            "experience_years".into(),
            Filter { operator: Operator::Gte, value: serde_json::json!(5) },
        );
        filters.insert("location".into(), Filter { operator: Operator::Contains, value: serde_json::json!("athens") });
        let t = base_translation(filters);
        let generated = generate_sql(&t).unwrap();
        assert_eq!(generated.params.len(), 4);
    }

    #[test]
    fn limit_is_clamped_to_100() {
        let mut t = base_translation(HashMap::new());
        t.limit = 5000;
        let generated = generate_sql(&t).unwrap();
        assert!(generated.sql.contains("LIMIT 100"));
    }

    #[test]
    fn education_level_alias_expands_to_set() {
        let mut filters = HashMap::new();
        filters.insert(
            "education_level".into(),
            Filter { operator: Operator::Exists, value: serde_json::json!("university") },
        );
        let t = base_translation(filters);
        let generated = generate_sql(&t).unwrap();
        assert_eq!(generated.params.len(), 3);
    }
}
