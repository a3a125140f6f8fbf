//! Relational Writer (C7, §4.7): transactional candidate writes over the
//! eight history/proficiency tables, consent records, structurer JSON,
//! raw-text backup, and quality warnings, followed by post-write count
//! verification.

use std::collections::HashMap;

use cv_common::model::{
    CefrLevel, Certification, DrivingLicense, Education, Experience, Language, ProficiencyLevel,
    QualityLevel, QualityWarning, Severity, Skill, SoftwareItem, TaxonomyLink, TrainingEvent,
};
use cv_common::text::normalize;
use cv_common::{CandidateProfile, MatchMethod};
use serde::{Deserialize, Serialize};
use tokio_postgres::{Client, NoTls, Transaction};
use uuid::Uuid;

use crate::{StorageError, StorageResult};

/// `PostgreSQL` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "cv_intake".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// A single table's expected-vs-actual row count from post-write
/// verification (§4.7).
#[derive(Debug, Clone)]
pub struct CountCheck {
    pub table: &'static str,
    pub expected: usize,
    pub actual: usize,
    pub severity: Severity,
}

impl CountCheck {
    #[must_use]
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }
}

/// Post-write verification output (§4.7), persisted alongside the intake
/// record by the orchestrator.
#[derive(Debug, Clone)]
pub struct WriteVerification {
    pub candidate_id: Uuid,
    pub checks: Vec<CountCheck>,
    pub unmatched_counts: HashMap<String, usize>,
}

impl WriteVerification {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.checks
            .iter()
            .any(|c| c.severity == Severity::Error && !c.matches())
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.checks
            .iter()
            .any(|c| c.severity == Severity::Warning && !c.matches())
    }
}

#[async_trait::async_trait]
pub trait MetadataStorage: Send + Sync {
    async fn init_schema(&self) -> StorageResult<()>;

    /// I4: find the active candidate sharing `email` or `phone`, if any.
    async fn find_duplicate(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> StorageResult<Option<Uuid>>;

    /// The full transactional write sequence (§4.7 steps 1-7), followed by
    /// post-write count verification.
    async fn write_candidate(&self, profile: &CandidateProfile) -> StorageResult<WriteVerification>;

    async fn get_candidate(&self, candidate_id: Uuid) -> StorageResult<CandidateProfile>;
}

/// `PostgreSQL` metadata storage implementation. Holds only the connection
/// config, not a live client: per §4.7, connections are re-opened fresh for
/// each write request to avoid cross-request aborted-transaction state.
pub struct PostgresMetadataStorage {
    config: PostgresConfig,
}

impl PostgresMetadataStorage {
    #[must_use]
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> StorageResult<Client> {
        let (client, connection) = tokio_postgres::connect(&self.config.connection_string(), NoTls)
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("postgres connection error: {e}");
            }
        });

        Ok(client)
    }

    async fn count_check(
        &self,
        client: &Client,
        table: &'static str,
        candidate_id: Uuid,
        expected: usize,
        severity: Severity,
    ) -> StorageResult<CountCheck> {
        let row = client
            .query_one(
                &format!("SELECT count(*) FROM {table} WHERE candidate_id = $1"),
                &[&candidate_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;
        let actual: i64 = row.get(0);
        Ok(CountCheck {
            table,
            expected,
            actual: actual as usize,
            severity,
        })
    }

    async fn verify_write(
        &self,
        candidate_id: Uuid,
        profile: &CandidateProfile,
    ) -> StorageResult<WriteVerification> {
        let client = self.connect().await?;

        let confident_skills = profile.skills.iter().filter(|s| s.taxonomy.is_confident()).count();
        let confident_software = profile.software.iter().filter(|s| s.taxonomy.is_confident()).count();
        let confident_certs = profile
            .certifications
            .iter()
            .filter(|c| c.taxonomy.is_confident())
            .count();

        let checks = vec![
            self.count_check(&client, "education_history", candidate_id, profile.education.len(), Severity::Error)
                .await?,
            self.count_check(&client, "experience_history", candidate_id, profile.experience.len(), Severity::Error)
                .await?,
            self.count_check(&client, "skill_proficiencies", candidate_id, confident_skills, Severity::Error)
                .await?,
            self.count_check(&client, "software_proficiencies", candidate_id, confident_software, Severity::Warning)
                .await?,
            self.count_check(&client, "certification_proficiencies", candidate_id, confident_certs, Severity::Warning)
                .await?,
            self.count_check(&client, "language_proficiencies", candidate_id, profile.languages.len(), Severity::Warning)
                .await?,
            self.count_check(&client, "driving_licenses", candidate_id, profile.driving_licenses.len(), Severity::Warning)
                .await?,
            self.count_check(&client, "training_events", candidate_id, profile.training.len(), Severity::Warning)
                .await?,
        ];

        let mut unmatched_counts = HashMap::new();
        for item_type in ["skill", "software", "certification"] {
            let row = client
                .query_one(
                    "SELECT count(*) FROM unmatched_items WHERE candidate_id = $1 AND item_type = $2",
                    &[&candidate_id, &item_type],
                )
                .await
                .map_err(|e| StorageError::PostgresError(e.to_string()))?;
            let count: i64 = row.get(0);
            unmatched_counts.insert(item_type.to_string(), count as usize);
        }

        Ok(WriteVerification {
            candidate_id,
            checks,
            unmatched_counts,
        })
    }
}

fn step_err(step: &str, e: tokio_postgres::Error) -> StorageError {
    StorageError::WriteStepFailed {
        step: step.to_string(),
        message: e.to_string(),
    }
}

fn quality_level_str(level: QualityLevel) -> &'static str {
    match level {
        QualityLevel::Excellent => "excellent",
        QualityLevel::Good => "good",
        QualityLevel::Fair => "fair",
        QualityLevel::Poor => "poor",
        QualityLevel::Insufficient => "insufficient",
    }
}

fn match_method_str(method: MatchMethod) -> &'static str {
    match method {
        MatchMethod::Exact => "exact",
        MatchMethod::Substring => "substring",
        MatchMethod::Fuzzy => "fuzzy",
        MatchMethod::FuzzySuggested => "fuzzy_suggested",
        MatchMethod::Semantic => "semantic",
        MatchMethod::Suggested => "suggested",
        MatchMethod::None => "none",
    }
}

fn proficiency_level_str(level: ProficiencyLevel) -> &'static str {
    match level {
        ProficiencyLevel::Beginner => "beginner",
        ProficiencyLevel::Intermediate => "intermediate",
        ProficiencyLevel::Advanced => "advanced",
        ProficiencyLevel::Expert => "expert",
        ProficiencyLevel::Master => "master",
    }
}

fn cefr_level_str(level: CefrLevel) -> &'static str {
    match level {
        CefrLevel::A1 => "A1",
        CefrLevel::A2 => "A2",
        CefrLevel::B1 => "B1",
        CefrLevel::B2 => "B2",
        CefrLevel::C1 => "C1",
        CefrLevel::C2 => "C2",
        CefrLevel::Native => "native",
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

async fn purge_history_tables(tx: &Transaction<'_>, candidate_id: Uuid) -> StorageResult<()> {
    const TABLES: &[&str] = &[
        "education_history",
        "experience_history",
        "skill_proficiencies",
        "software_proficiencies",
        "certification_proficiencies",
        "language_proficiencies",
        "training_events",
        "driving_licenses",
    ];
    for table in TABLES {
        tx.execute(&format!("DELETE FROM {table} WHERE candidate_id = $1"), &[&candidate_id])
            .await
            .map_err(|e| step_err(&format!("purge_{table}"), e))?;
    }
    Ok(())
}

async fn insert_education(
    tx: &Transaction<'_>,
    candidate_id: Uuid,
    education: &[Education],
) -> StorageResult<()> {
    for entry in education {
        tx.execute(
            r"
            INSERT INTO education_history
                (candidate_id, institution, degree, field_of_study, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
            &[
                &candidate_id,
                &entry.institution,
                &entry.degree,
                &entry.field_of_study,
                &entry.range.start,
                &entry.range.end,
            ],
        )
        .await
        .map_err(|e| step_err("insert_education", e))?;
    }
    Ok(())
}

async fn insert_experience(
    tx: &Transaction<'_>,
    candidate_id: Uuid,
    experience: &[Experience],
) -> StorageResult<()> {
    for entry in experience {
        tx.execute(
            r"
            INSERT INTO experience_history
                (candidate_id, title, company, location, description, start_date, end_date,
                 is_current, role_taxonomy_id, role_similarity, role_match_method)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
            &[
                &candidate_id,
                &entry.title,
                &entry.company,
                &entry.location,
                &entry.description,
                &entry.range.start,
                &entry.range.end,
                &entry.is_current,
                &entry.role_taxonomy.canonical_id,
                &entry.role_taxonomy.similarity,
                &match_method_str(entry.role_taxonomy.match_method),
            ],
        )
        .await
        .map_err(|e| step_err("insert_experience", e))?;
    }
    Ok(())
}

async fn insert_unmatched(
    tx: &Transaction<'_>,
    candidate_id: Uuid,
    item_type: &str,
    original_value: &str,
    taxonomy: &TaxonomyLink,
) -> StorageResult<()> {
    tx.execute(
        r"
        INSERT INTO unmatched_items
            (candidate_id, item_type, original_value, normalized_value, suggested_id, similarity)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (candidate_id, item_type, normalized_value) DO UPDATE SET
            original_value = EXCLUDED.original_value,
            suggested_id = EXCLUDED.suggested_id,
            similarity = EXCLUDED.similarity
        ",
        &[
            &candidate_id,
            &item_type,
            &original_value,
            &normalize(original_value),
            &taxonomy.suggested_id,
            &taxonomy.similarity,
        ],
    )
    .await
    .map_err(|e| step_err("insert_unmatched", e))?;
    Ok(())
}

async fn insert_skills(tx: &Transaction<'_>, candidate_id: Uuid, skills: &[Skill]) -> StorageResult<()> {
    for skill in skills {
        if skill.taxonomy.is_confident() {
            tx.execute(
                r"
                INSERT INTO skill_proficiencies
                    (candidate_id, name, level, taxonomy_id, similarity, match_method)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
                &[
                    &candidate_id,
                    &skill.name,
                    &skill.level.map(proficiency_level_str),
                    &skill.taxonomy.canonical_id,
                    &skill.taxonomy.similarity,
                    &match_method_str(skill.taxonomy.match_method),
                ],
            )
            .await
            .map_err(|e| step_err("insert_skill", e))?;
        } else {
            insert_unmatched(tx, candidate_id, "skill", &skill.name, &skill.taxonomy).await?;
        }
    }
    Ok(())
}

async fn insert_software(
    tx: &Transaction<'_>,
    candidate_id: Uuid,
    software: &[SoftwareItem],
) -> StorageResult<()> {
    for item in software {
        if item.taxonomy.is_confident() {
            tx.execute(
                r"
                INSERT INTO software_proficiencies (candidate_id, name, taxonomy_id, similarity, match_method)
                VALUES ($1, $2, $3, $4, $5)
                ",
                &[
                    &candidate_id,
                    &item.name,
                    &item.taxonomy.canonical_id,
                    &item.taxonomy.similarity,
                    &match_method_str(item.taxonomy.match_method),
                ],
            )
            .await
            .map_err(|e| step_err("insert_software", e))?;
        } else {
            insert_unmatched(tx, candidate_id, "software", &item.name, &item.taxonomy).await?;
        }
    }
    Ok(())
}

async fn insert_certifications(
    tx: &Transaction<'_>,
    candidate_id: Uuid,
    certifications: &[Certification],
) -> StorageResult<()> {
    for cert in certifications {
        if cert.taxonomy.is_confident() {
            tx.execute(
                r"
                INSERT INTO certification_proficiencies
                    (candidate_id, name, issuer, date, taxonomy_id, similarity, match_method)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
                &[
                    &candidate_id,
                    &cert.name,
                    &cert.issuer,
                    &cert.date,
                    &cert.taxonomy.canonical_id,
                    &cert.taxonomy.similarity,
                    &match_method_str(cert.taxonomy.match_method),
                ],
            )
            .await
            .map_err(|e| step_err("insert_certification", e))?;
        } else {
            insert_unmatched(tx, candidate_id, "certification", &cert.name, &cert.taxonomy).await?;
        }
    }
    Ok(())
}

async fn insert_languages(
    tx: &Transaction<'_>,
    candidate_id: Uuid,
    languages: &[Language],
) -> StorageResult<()> {
    for lang in languages {
        tx.execute(
            "INSERT INTO language_proficiencies (candidate_id, name, iso_code, level) VALUES ($1, $2, $3, $4)",
            &[&candidate_id, &lang.name, &lang.iso_code, &lang.level.map(cefr_level_str)],
        )
        .await
        .map_err(|e| step_err("insert_language", e))?;
    }
    Ok(())
}

async fn insert_training(
    tx: &Transaction<'_>,
    candidate_id: Uuid,
    training: &[TrainingEvent],
) -> StorageResult<()> {
    for event in training {
        tx.execute(
            "INSERT INTO training_events (candidate_id, name, provider, date) VALUES ($1, $2, $3, $4)",
            &[&candidate_id, &event.name, &event.provider, &event.date],
        )
        .await
        .map_err(|e| step_err("insert_training", e))?;
    }
    Ok(())
}

async fn insert_driving_licenses(
    tx: &Transaction<'_>,
    candidate_id: Uuid,
    licenses: &[DrivingLicense],
) -> StorageResult<()> {
    for license in licenses {
        tx.execute(
            "INSERT INTO driving_licenses (candidate_id, category) VALUES ($1, $2)",
            &[&candidate_id, &license.category],
        )
        .await
        .map_err(|e| step_err("insert_driving_license", e))?;
    }
    Ok(())
}

async fn insert_warnings(
    tx: &Transaction<'_>,
    candidate_id: Uuid,
    warnings: &[QualityWarning],
) -> StorageResult<()> {
    for warning in warnings {
        tx.execute(
            r"
            INSERT INTO quality_warnings
                (candidate_id, category, severity, field, section, original, suggested,
                 was_auto_fixed, llm_detected, message_en, message_el)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
            &[
                &candidate_id,
                &warning.category,
                &severity_str(warning.severity),
                &warning.field,
                &warning.section,
                &warning.original,
                &warning.suggested,
                &warning.was_auto_fixed,
                &warning.llm_detected,
                &warning.message_en,
                &warning.message_el,
            ],
        )
        .await
        .map_err(|e| step_err("insert_warning", e))?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl MetadataStorage for PostgresMetadataStorage {
    async fn init_schema(&self) -> StorageResult<()> {
        let client = self.connect().await?;
        client
            .batch_execute(
                r"
                CREATE EXTENSION IF NOT EXISTS pg_trgm;

                CREATE TABLE IF NOT EXISTS candidates (
                    id UUID PRIMARY KEY,
                    full_name TEXT NOT NULL,
                    full_name_normalized TEXT NOT NULL,
                    email TEXT,
                    phone TEXT,
                    date_of_birth DATE,
                    nationality TEXT,
                    location TEXT,
                    address TEXT,
                    raw_text TEXT,
                    structurer_json JSONB,
                    profile_snapshot JSONB,
                    completeness_score REAL NOT NULL DEFAULT 0,
                    quality_level TEXT NOT NULL DEFAULT 'insufficient',
                    is_active BOOLEAN NOT NULL DEFAULT TRUE,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
                );
                CREATE INDEX IF NOT EXISTS idx_candidates_email ON candidates (email);
                CREATE INDEX IF NOT EXISTS idx_candidates_phone ON candidates (phone);
                CREATE INDEX IF NOT EXISTS idx_candidates_active ON candidates (is_active);

                CREATE TABLE IF NOT EXISTS education_history (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    institution TEXT NOT NULL,
                    degree TEXT NOT NULL,
                    field_of_study TEXT,
                    start_date DATE NOT NULL,
                    end_date DATE
                );
                CREATE INDEX IF NOT EXISTS idx_education_candidate ON education_history (candidate_id);

                CREATE TABLE IF NOT EXISTS experience_history (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    title TEXT NOT NULL,
                    company TEXT NOT NULL,
                    location TEXT,
                    description TEXT,
                    start_date DATE NOT NULL,
                    end_date DATE,
                    is_current BOOLEAN NOT NULL DEFAULT FALSE,
                    role_taxonomy_id TEXT,
                    role_similarity REAL,
                    role_match_method TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_experience_candidate ON experience_history (candidate_id);

                CREATE TABLE IF NOT EXISTS skill_proficiencies (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    name TEXT NOT NULL,
                    level TEXT,
                    taxonomy_id TEXT,
                    similarity REAL,
                    match_method TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_skills_candidate ON skill_proficiencies (candidate_id);

                CREATE TABLE IF NOT EXISTS software_proficiencies (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    name TEXT NOT NULL,
                    taxonomy_id TEXT,
                    similarity REAL,
                    match_method TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_software_candidate ON software_proficiencies (candidate_id);

                CREATE TABLE IF NOT EXISTS certification_proficiencies (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    name TEXT NOT NULL,
                    issuer TEXT,
                    date DATE,
                    taxonomy_id TEXT,
                    similarity REAL,
                    match_method TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_certifications_candidate ON certification_proficiencies (candidate_id);

                CREATE TABLE IF NOT EXISTS language_proficiencies (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    name TEXT NOT NULL,
                    iso_code TEXT,
                    level TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_languages_candidate ON language_proficiencies (candidate_id);

                CREATE TABLE IF NOT EXISTS training_events (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    name TEXT NOT NULL,
                    provider TEXT,
                    date DATE
                );
                CREATE INDEX IF NOT EXISTS idx_training_candidate ON training_events (candidate_id);

                CREATE TABLE IF NOT EXISTS driving_licenses (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    category TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_licenses_candidate ON driving_licenses (candidate_id);

                CREATE TABLE IF NOT EXISTS unmatched_items (
                    candidate_id UUID NOT NULL,
                    item_type TEXT NOT NULL,
                    original_value TEXT NOT NULL,
                    normalized_value TEXT NOT NULL,
                    suggested_id TEXT,
                    similarity REAL,
                    PRIMARY KEY (candidate_id, item_type, normalized_value)
                );

                CREATE TABLE IF NOT EXISTS consent_records (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    consent_type TEXT NOT NULL,
                    granted BOOLEAN NOT NULL,
                    granted_at TIMESTAMPTZ NOT NULL DEFAULT now()
                );
                CREATE INDEX IF NOT EXISTS idx_consent_candidate ON consent_records (candidate_id);

                CREATE TABLE IF NOT EXISTS quality_warnings (
                    id SERIAL PRIMARY KEY,
                    candidate_id UUID NOT NULL,
                    category TEXT NOT NULL,
                    severity TEXT NOT NULL,
                    field TEXT NOT NULL,
                    section TEXT NOT NULL,
                    original TEXT,
                    suggested TEXT,
                    was_auto_fixed BOOLEAN NOT NULL,
                    llm_detected BOOLEAN NOT NULL,
                    message_en TEXT NOT NULL,
                    message_el TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_warnings_candidate ON quality_warnings (candidate_id);

                CREATE TABLE IF NOT EXISTS query_cache (
                    cache_key TEXT PRIMARY KEY,
                    query_type TEXT NOT NULL,
                    translation JSONB NOT NULL,
                    sql_text TEXT,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                );
                ",
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::info!("candidate relational schema initialized");
        Ok(())
    }

    async fn find_duplicate(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> StorageResult<Option<Uuid>> {
        if email.is_none() && phone.is_none() {
            return Ok(None);
        }
        let client = self.connect().await?;
        let row = client
            .query_opt(
                "SELECT id FROM candidates WHERE is_active AND (email = $1 OR phone = $2) LIMIT 1",
                &[&email, &phone],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn write_candidate(&self, profile: &CandidateProfile) -> StorageResult<WriteVerification> {
        let mut client = self.connect().await?;
        let tx = client.transaction().await.map_err(|e| step_err("begin", e))?;

        let existing = tx
            .query_opt(
                "SELECT id FROM candidates WHERE is_active AND (email = $1 OR phone = $2) AND id <> $3 LIMIT 1",
                &[&profile.identity.email, &profile.identity.phone, &profile.id],
            )
            .await
            .map_err(|e| step_err("duplicate_search", e))?;

        let is_update = existing.is_some();
        let candidate_id: Uuid = existing.map(|row| row.get(0)).unwrap_or(profile.id);

        let snapshot = serde_json::to_value(profile).map_err(|e| StorageError::SerializationError(e.to_string()))?;

        tx.execute(
            r"
            INSERT INTO candidates
                (id, full_name, full_name_normalized, email, phone, date_of_birth, nationality,
                 location, address, profile_snapshot, completeness_score, quality_level, is_active, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, true, now())
            ON CONFLICT (id) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                full_name_normalized = EXCLUDED.full_name_normalized,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                date_of_birth = EXCLUDED.date_of_birth,
                nationality = EXCLUDED.nationality,
                location = EXCLUDED.location,
                address = EXCLUDED.address,
                profile_snapshot = EXCLUDED.profile_snapshot,
                completeness_score = EXCLUDED.completeness_score,
                quality_level = EXCLUDED.quality_level,
                updated_at = now()
            ",
            &[
                &candidate_id,
                &profile.identity.full_name,
                &profile.identity.full_name_normalized,
                &profile.identity.email,
                &profile.identity.phone,
                &profile.identity.date_of_birth,
                &profile.identity.nationality,
                &profile.identity.location,
                &profile.identity.address,
                &snapshot,
                &profile.completeness_score,
                &quality_level_str(profile.quality_level),
            ],
        )
        .await
        .map_err(|e| step_err("upsert_candidate", e))?;

        if is_update {
            purge_history_tables(&tx, candidate_id).await?;
        }

        insert_education(&tx, candidate_id, &profile.education).await?;
        insert_experience(&tx, candidate_id, &profile.experience).await?;
        insert_skills(&tx, candidate_id, &profile.skills).await?;
        insert_software(&tx, candidate_id, &profile.software).await?;
        insert_certifications(&tx, candidate_id, &profile.certifications).await?;
        insert_languages(&tx, candidate_id, &profile.languages).await?;
        insert_training(&tx, candidate_id, &profile.training).await?;
        insert_driving_licenses(&tx, candidate_id, &profile.driving_licenses).await?;

        tx.execute(
            "INSERT INTO consent_records (candidate_id, consent_type, granted) VALUES ($1, 'data_processing', true)",
            &[&candidate_id],
        )
        .await
        .map_err(|e| step_err("consent", e))?;

        tx.execute(
            "UPDATE candidates SET structurer_json = $2 WHERE id = $1",
            &[&candidate_id, &profile.structurer_json],
        )
        .await
        .map_err(|e| step_err("structurer_json", e))?;

        tx.execute(
            "UPDATE candidates SET raw_text = $2 WHERE id = $1",
            &[&candidate_id, &profile.raw_text],
        )
        .await
        .map_err(|e| step_err("raw_text", e))?;

        insert_warnings(&tx, candidate_id, &profile.warnings).await?;

        tx.commit().await.map_err(|e| step_err("commit", e))?;

        self.verify_write(candidate_id, profile).await
    }

    async fn get_candidate(&self, candidate_id: Uuid) -> StorageResult<CandidateProfile> {
        let client = self.connect().await?;
        let row = client
            .query_opt(
                "SELECT profile_snapshot FROM candidates WHERE id = $1",
                &[&candidate_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(candidate_id.to_string()))?;

        let snapshot: serde_json::Value = row.get(0);
        serde_json::from_value(snapshot).map_err(|e| StorageError::SerializationError(e.to_string()))
    }
}
