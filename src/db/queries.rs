//! SQL query constants
//!
//! Contains all SQL queries used by the application.

/// Schema bootstrap, run in order at startup
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        first_name VARCHAR(255) NOT NULL,
        last_name VARCHAR(255) NOT NULL,
        middle_name VARCHAR(255),
        email VARCHAR(255) UNIQUE NOT NULL,
        password_hash VARCHAR(255) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS toys (
        toy_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        name VARCHAR(255) NOT NULL,
        description TEXT,
        photo_url TEXT,
        idempotency_token TEXT UNIQUE NOT NULL,
        status TEXT NOT NULL DEFAULT 'created'
            CHECK (status IN ('created', 'exchanging', 'removed')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS exchanges (
        exchange_id TEXT PRIMARY KEY,
        src_toy_id TEXT NOT NULL REFERENCES toys(toy_id),
        dst_toy_id TEXT NOT NULL REFERENCES toys(toy_id),
        idempotency_token TEXT UNIQUE NOT NULL,
        status TEXT NOT NULL DEFAULT 'created'
            CHECK (status IN ('created', 'confirm', 'success', 'failed')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS exchange_details (
        exchange_id TEXT NOT NULL REFERENCES exchanges(exchange_id),
        toy_id TEXT NOT NULL REFERENCES toys(toy_id),
        user_id TEXT NOT NULL REFERENCES users(user_id),
        status TEXT NOT NULL DEFAULT 'created'
            CHECK (status IN ('created', 'confirm_1', 'confirm_2', 'success', 'failed')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (exchange_id, toy_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_toys_user_id ON toys(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_exchange_details_user_id ON exchange_details(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_exchange_details_toy_id ON exchange_details(toy_id)",
];

// ============================================
// Toys
// ============================================

/// Insert a toy; a replayed token returns the stored row
pub const UPSERT_TOY: &str = r#"
    INSERT INTO toys (toy_id, user_id, name, description, photo_url, idempotency_token, status, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (idempotency_token) DO UPDATE SET idempotency_token = EXCLUDED.idempotency_token
    RETURNING toy_id, user_id, name, description, photo_url, idempotency_token, status, created_at, updated_at
"#;

pub const SELECT_TOY_BY_TOKEN: &str = r#"
    SELECT toy_id, user_id, name, description, photo_url, idempotency_token, status, created_at, updated_at
    FROM toys
    WHERE idempotency_token = $1
"#;

pub const SELECT_TOY: &str = r#"
    SELECT toy_id, user_id, name, description, photo_url, idempotency_token, status, created_at, updated_at
    FROM toys
    WHERE toy_id = $1 AND status <> 'removed'
"#;

pub const SELECT_TOY_BY_OWNER: &str = r#"
    SELECT toy_id, user_id, name, description, photo_url, idempotency_token, status, created_at, updated_at
    FROM toys
    WHERE toy_id = $1 AND user_id = $2 AND status <> 'removed'
"#;

/// Replace mutable fields; a NULL photo keeps the stored one
pub const UPDATE_TOY: &str = r#"
    UPDATE toys
    SET name = $3, description = $4, photo_url = COALESCE($5, photo_url), updated_at = NOW()
    WHERE toy_id = $1 AND user_id = $2 AND status <> 'removed'
    RETURNING toy_id, user_id, name, description, photo_url, idempotency_token, status, created_at, updated_at
"#;

pub const UPDATE_TOY_STATUS: &str = r#"
    UPDATE toys
    SET status = $3, updated_at = NOW()
    WHERE toy_id = $1 AND user_id = $2 AND status <> 'removed'
    RETURNING toy_id, user_id, name, description, photo_url, idempotency_token, status, created_at, updated_at
"#;

pub const LIST_TOYS: &str = r#"
    SELECT toy_id, user_id, name, description, photo_url, idempotency_token, status, created_at, updated_at
    FROM toys
    WHERE status = ANY($1)
        AND ($2::text[] IS NULL OR user_id = ANY($2))
        AND ($3::text[] IS NULL OR NOT (user_id = ANY($3)))
        AND ($4::text IS NULL OR toy_id >= $4)
    ORDER BY toy_id, updated_at DESC
    LIMIT $5
"#;

// ============================================
// Exchanges
// ============================================

/// Insert an exchange; `inserted` is false when the token was replayed
pub const UPSERT_EXCHANGE: &str = r#"
    INSERT INTO exchanges (exchange_id, src_toy_id, dst_toy_id, idempotency_token, status, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (idempotency_token) DO UPDATE SET idempotency_token = EXCLUDED.idempotency_token
    RETURNING exchange_id, src_toy_id, dst_toy_id, idempotency_token, status, created_at, updated_at,
        (xmax = 0) AS inserted
"#;

pub const SELECT_EXCHANGE_BY_TOKEN: &str = r#"
    SELECT exchange_id, src_toy_id, dst_toy_id, idempotency_token, status, created_at, updated_at
    FROM exchanges
    WHERE idempotency_token = $1
"#;

/// Row-lock the live toys of a proposal; competing proposals queue here.
/// NO KEY UPDATE leaves the FK share locks of exchange inserts compatible.
pub const LOCK_TOYS: &str = r#"
    SELECT toy_id, user_id
    FROM toys
    WHERE toy_id = ANY($1) AND status <> 'removed'
    ORDER BY toy_id
    FOR NO KEY UPDATE
"#;

/// Another still-active exchange already holds one of the toys
pub const TOY_IN_ACTIVE_EXCHANGE: &str = r#"
    SELECT d.toy_id
    FROM exchange_details d
    JOIN exchanges e ON e.exchange_id = d.exchange_id
    WHERE d.toy_id = ANY($1)
        AND e.exchange_id <> $2
        AND e.status IN ('created', 'confirm')
    LIMIT 1
"#;

pub const INSERT_EXCHANGE_DETAILS: &str = r#"
    INSERT INTO exchange_details (exchange_id, toy_id, user_id, status, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

pub const LOCK_EXCHANGE: &str = r#"
    SELECT exchange_id FROM exchanges WHERE exchange_id = $1 FOR UPDATE
"#;

pub const SELECT_DETAILS_FOR_UPDATE: &str = r#"
    SELECT exchange_id, toy_id, user_id, status, created_at, updated_at
    FROM exchange_details
    WHERE exchange_id = $1
    ORDER BY user_id
    FOR UPDATE
"#;

pub const UPDATE_DETAILS_STATUS: &str = r#"
    UPDATE exchange_details
    SET status = $3, updated_at = NOW()
    WHERE exchange_id = $1 AND user_id = $2
"#;

pub const UPDATE_EXCHANGE_STATUS: &str = r#"
    UPDATE exchanges
    SET status = $2, updated_at = NOW()
    WHERE exchange_id = $1
"#;

/// Flat participant rows for a set of exchanges
pub const SELECT_EXCHANGE_ROWS: &str = r#"
    SELECT
        e.exchange_id, e.status, e.idempotency_token, e.src_toy_id, e.dst_toy_id,
        e.created_at, e.updated_at,
        t.toy_id, t.name, t.description, t.photo_url,
        u.user_id, u.first_name, u.middle_name, u.last_name,
        d.status
    FROM exchanges e
    JOIN exchange_details d ON d.exchange_id = e.exchange_id
    JOIN toys t ON t.toy_id = d.toy_id
    JOIN users u ON u.user_id = d.user_id
    WHERE e.exchange_id = ANY($1)
    ORDER BY e.exchange_id, e.updated_at DESC, d.user_id
"#;

pub const LIST_EXCHANGE_IDS: &str = r#"
    SELECT e.exchange_id
    FROM exchanges e
    JOIN exchange_details d ON d.exchange_id = e.exchange_id
    WHERE d.user_id = $1
        AND ($2::text[] IS NULL OR e.status = ANY($2))
        AND ($3::text IS NULL OR e.exchange_id >= $3)
    ORDER BY e.exchange_id, e.updated_at DESC
    LIMIT $4
"#;

// ============================================
// Users
// ============================================

pub const INSERT_USER: &str = r#"
    INSERT INTO users (user_id, first_name, last_name, middle_name, email, password_hash, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING user_id, first_name, last_name, middle_name, email, password_hash, created_at, updated_at
"#;

pub const SELECT_USER: &str = r#"
    SELECT user_id, first_name, last_name, middle_name, email, password_hash, created_at, updated_at
    FROM users
    WHERE user_id = $1
"#;

pub const SELECT_USER_BY_EMAIL: &str = r#"
    SELECT user_id, first_name, last_name, middle_name, email, password_hash, created_at, updated_at
    FROM users
    WHERE email = $1
"#;
