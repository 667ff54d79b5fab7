//! SQL schema for the resolver's SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per (identifier, source). Rows are stored as the JSON the
-- importer accepted.
CREATE TABLE IF NOT EXISTS organisation (
    id          TEXT NOT NULL,
    source      TEXT NOT NULL,
    record_json TEXT NOT NULL,
    PRIMARY KEY (id, source)
);

-- Every identifier a record lists in orgIDs, for reverse lookup.
CREATE TABLE IF NOT EXISTS organisation_org_ids (
    org_id TEXT NOT NULL,
    id     TEXT NOT NULL,
    source TEXT NOT NULL,
    FOREIGN KEY (id, source) REFERENCES organisation(id, source)
        ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS linked_organisations (
    organisation_id_a TEXT NOT NULL,
    organisation_id_b TEXT NOT NULL,
    source            TEXT NOT NULL,
    description       TEXT,
    PRIMARY KEY (organisation_id_a, organisation_id_b, source)
);

-- Search index. last_updated is the RFC 3339 timestamp of the indexing run
-- that last wrote the row.
CREATE TABLE IF NOT EXISTS organisation_index (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    search_text   TEXT NOT NULL,   -- lowercased names and identifiers
    document_json TEXT NOT NULL,
    last_updated  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS organisation_index_ids (
    org_id TEXT NOT NULL,
    id     TEXT NOT NULL REFERENCES organisation_index(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS organisation_index_completions (
    input  TEXT NOT NULL,          -- lowercased
    id     TEXT NOT NULL REFERENCES organisation_index(id) ON DELETE CASCADE,
    weight INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS org_ids_org_id_idx      ON organisation_org_ids(org_id);
CREATE INDEX IF NOT EXISTS org_ids_record_idx      ON organisation_org_ids(id, source);
CREATE INDEX IF NOT EXISTS links_a_idx             ON linked_organisations(organisation_id_a);
CREATE INDEX IF NOT EXISTS links_b_idx             ON linked_organisations(organisation_id_b);
CREATE INDEX IF NOT EXISTS index_last_updated_idx  ON organisation_index(last_updated);
CREATE INDEX IF NOT EXISTS index_ids_org_id_idx    ON organisation_index_ids(org_id);
CREATE INDEX IF NOT EXISTS index_ids_id_idx        ON organisation_index_ids(id);
CREATE INDEX IF NOT EXISTS completions_input_idx   ON organisation_index_completions(input);
CREATE INDEX IF NOT EXISTS completions_id_idx      ON organisation_index_completions(id);

PRAGMA user_version = 1;
";
