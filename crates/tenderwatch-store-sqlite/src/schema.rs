//! SQL schema for the tenderwatch SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Timestamps are fixed-width RFC 3339 UTC strings, so text comparison is
/// chronological. Amounts are decimal strings rounded to cents.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS classifiers (
    classifier_id INTEGER PRIMARY KEY AUTOINCREMENT,
    scheme        TEXT NOT NULL,
    description   TEXT NOT NULL,
    UNIQUE (scheme, description)
);

CREATE TABLE IF NOT EXISTS tenders (
    tender_id                 TEXT PRIMARY KEY,   -- 32-char upstream UUID
    ocid                      TEXT NOT NULL,
    date_created              TEXT NOT NULL,
    date_modified             TEXT NOT NULL,      -- bridge timestamp
    title                     TEXT,
    value_amount              TEXT,
    status                    TEXT,
    enquiry_period_start_date TEXT,
    enquiry_period_end_date   TEXT,
    tender_period_start_date  TEXT,
    tender_period_end_date    TEXT,
    auction_period_start_date TEXT,
    auction_period_end_date   TEXT,
    award_period_start_date   TEXT,
    award_period_end_date     TEXT,
    notice_publication_date   TEXT,
    classifier_id             INTEGER REFERENCES classifiers(classifier_id)
);

CREATE TABLE IF NOT EXISTS documents (
    document_id    TEXT PRIMARY KEY,
    tender_id      TEXT NOT NULL REFERENCES tenders(tender_id),
    status         TEXT,
    document_of    TEXT,
    title          TEXT,
    format         TEXT,
    url            TEXT,
    hash           TEXT,
    date_published TEXT,
    date_modified  TEXT,
    first_seen     TEXT
);

CREATE TABLE IF NOT EXISTS bids (
    bid_id              TEXT PRIMARY KEY,
    tender_id           TEXT NOT NULL REFERENCES tenders(tender_id),
    status              TEXT,
    date                TEXT,
    value_amount        TEXT,
    tenderer_id         TEXT,
    tenderer_legal_name TEXT,
    first_seen          TEXT
);

CREATE TABLE IF NOT EXISTS awards (
    award_id                    TEXT PRIMARY KEY,
    tender_id                   TEXT NOT NULL REFERENCES tenders(tender_id),
    bid_id                      TEXT,
    status                      TEXT,
    title                       TEXT,
    value_amount                TEXT,
    award_date                  TEXT,
    complaint_period_start_date TEXT,
    complaint_period_end_date   TEXT,
    first_seen                  TEXT
);

CREATE TABLE IF NOT EXISTS complaints (
    complaint_id         TEXT PRIMARY KEY,
    tender_id            TEXT NOT NULL REFERENCES tenders(tender_id),
    status               TEXT,
    title                TEXT,
    description          TEXT,
    complaint_type       TEXT,
    date                 TEXT,
    date_submitted       TEXT,
    date_answered        TEXT,
    highlighted_keywords TEXT,   -- JSON; NULL until analyzed
    first_seen           TEXT
);

-- Change tables are strictly append-only.
CREATE TABLE IF NOT EXISTS tender_changes (
    change_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    tender_id   TEXT NOT NULL REFERENCES tenders(tender_id),
    change_date TEXT NOT NULL,
    field_name  TEXT NOT NULL CHECK (length(field_name) <= 50),
    old_value   TEXT,
    new_value   TEXT
);

CREATE TABLE IF NOT EXISTS document_changes (
    change_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL REFERENCES documents(document_id),
    tender_id   TEXT NOT NULL REFERENCES tenders(tender_id),
    change_date TEXT NOT NULL,
    field_name  TEXT NOT NULL CHECK (length(field_name) <= 50),
    old_value   TEXT,
    new_value   TEXT
);

CREATE TABLE IF NOT EXISTS bid_changes (
    change_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    bid_id      TEXT NOT NULL REFERENCES bids(bid_id),
    tender_id   TEXT NOT NULL REFERENCES tenders(tender_id),
    change_date TEXT NOT NULL,
    field_name  TEXT NOT NULL CHECK (length(field_name) <= 50),
    old_value   TEXT,
    new_value   TEXT
);

CREATE TABLE IF NOT EXISTS award_changes (
    change_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    award_id    TEXT NOT NULL REFERENCES awards(award_id),
    tender_id   TEXT NOT NULL REFERENCES tenders(tender_id),
    change_date TEXT NOT NULL,
    field_name  TEXT NOT NULL CHECK (length(field_name) <= 50),
    old_value   TEXT,
    new_value   TEXT
);

CREATE TABLE IF NOT EXISTS complaint_changes (
    change_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    complaint_id TEXT NOT NULL REFERENCES complaints(complaint_id),
    tender_id    TEXT NOT NULL REFERENCES tenders(tender_id),
    change_date  TEXT NOT NULL,
    field_name   TEXT NOT NULL CHECK (length(field_name) <= 50),
    old_value    TEXT,
    new_value    TEXT
);

-- One accumulated score per tender.
CREATE TABLE IF NOT EXISTS violation_scores (
    tender_id       TEXT PRIMARY KEY REFERENCES tenders(tender_id),
    scores          TEXT NOT NULL,   -- JSON: domain -> {score, keywords}
    date_calculated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    subscriber TEXT NOT NULL,
    tender_id  TEXT NOT NULL REFERENCES tenders(tender_id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (subscriber, tender_id)
);

CREATE INDEX IF NOT EXISTS tenders_ocid_idx          ON tenders(ocid);
CREATE INDEX IF NOT EXISTS documents_tender_idx      ON documents(tender_id);
CREATE INDEX IF NOT EXISTS bids_tender_idx           ON bids(tender_id);
CREATE INDEX IF NOT EXISTS awards_tender_idx         ON awards(tender_id);
CREATE INDEX IF NOT EXISTS complaints_tender_idx     ON complaints(tender_id);
CREATE INDEX IF NOT EXISTS tender_changes_idx        ON tender_changes(tender_id, change_date);
CREATE INDEX IF NOT EXISTS document_changes_idx      ON document_changes(tender_id, change_date);
CREATE INDEX IF NOT EXISTS bid_changes_idx           ON bid_changes(tender_id, change_date);
CREATE INDEX IF NOT EXISTS award_changes_idx         ON award_changes(tender_id, change_date);
CREATE INDEX IF NOT EXISTS complaint_changes_idx     ON complaint_changes(tender_id, change_date);
CREATE INDEX IF NOT EXISTS subscriptions_tender_idx  ON subscriptions(tender_id);

PRAGMA user_version = 1;
";
