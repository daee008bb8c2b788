//! SQLite schema definition.

/// Complete database schema for Medoryx.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Directory (records supplied by the identity service)
-- ============================================================================

CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    role TEXT NOT NULL CHECK (role IN ('patient', 'doctor', 'pharmacy', 'hospital')),
    name TEXT NOT NULL,
    phone TEXT,
    city TEXT,
    area TEXT,
    longitude REAL,
    latitude REAL,
    -- Hospitals only
    total_beds INTEGER,
    icu_available INTEGER,
    nicu_available INTEGER,
    ventilators_available INTEGER,
    general_beds_available INTEGER,
    beds_available INTEGER,                       -- sum of the four categories
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK ((longitude IS NULL) = (latitude IS NULL)),
    CHECK (
        beds_available IS NULL OR beds_available =
            icu_available + nicu_available + ventilators_available + general_beds_available
    )
);

CREATE INDEX IF NOT EXISTS idx_accounts_role ON accounts(role);
CREATE INDEX IF NOT EXISTS idx_accounts_geo ON accounts(latitude, longitude);
CREATE INDEX IF NOT EXISTS idx_accounts_city ON accounts(city COLLATE NOCASE, area COLLATE NOCASE);

-- ============================================================================
-- Medicines (pharmacy inventory)
-- ============================================================================

CREATE TABLE IF NOT EXISTS medicines (
    id TEXT PRIMARY KEY,
    pharmacy_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    brand TEXT,
    category TEXT,
    price REAL NOT NULL CHECK (price >= 0),
    stock INTEGER NOT NULL CHECK (stock >= 0),
    expiry_date TEXT NOT NULL,                    -- YYYY-MM-DD
    batch_number TEXT,
    dosage_form TEXT,
    strength TEXT,
    is_on_marketplace INTEGER NOT NULL DEFAULT 0,
    marketplace_price REAL,
    on_exchange INTEGER NOT NULL DEFAULT 0,
    exchange_price REAL,
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    -- A discount price only exists alongside its flag
    CHECK (is_on_marketplace = 1 OR marketplace_price IS NULL),
    CHECK (on_exchange = 1 OR exchange_price IS NULL)
);

CREATE INDEX IF NOT EXISTS idx_medicines_pharmacy ON medicines(pharmacy_id);
CREATE INDEX IF NOT EXISTS idx_medicines_name ON medicines(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_medicines_marketplace ON medicines(is_on_marketplace, expiry_date);
CREATE INDEX IF NOT EXISTS idx_medicines_exchange ON medicines(on_exchange, expiry_date);

-- ============================================================================
-- Appointments (booking status + queue membership)
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    doctor_id TEXT NOT NULL,
    start_time TEXT NOT NULL,                     -- RFC 3339 UTC
    end_time TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'confirmed', 'cancelled', 'completed')),
    reason TEXT,
    notes TEXT,
    queue_date TEXT,                              -- YYYY-MM-DD, NULL until admitted
    token_number INTEGER,
    queue_status TEXT
        CHECK (queue_status IS NULL OR queue_status IN ('waiting', 'serving', 'completed', 'missed')),
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK ((queue_status IS NULL) = (token_number IS NULL)),
    CHECK ((queue_status IS NULL) = (queue_date IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_appointments_doctor ON appointments(doctor_id, start_time);
CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id, start_time);
CREATE INDEX IF NOT EXISTS idx_appointments_queue
    ON appointments(doctor_id, queue_date, queue_status, token_number);

-- Tokens are unique per doctor per day
CREATE UNIQUE INDEX IF NOT EXISTS idx_appointments_token
    ON appointments(doctor_id, queue_date, token_number)
    WHERE token_number IS NOT NULL;

-- At most one serving appointment per doctor per day
CREATE UNIQUE INDEX IF NOT EXISTS idx_appointments_serving
    ON appointments(doctor_id, queue_date)
    WHERE queue_status = 'serving';

-- ============================================================================
-- Doctor Queues (one row per doctor per day, version-checked)
-- ============================================================================

CREATE TABLE IF NOT EXISTS doctor_queues (
    doctor_id TEXT NOT NULL,
    queue_date TEXT NOT NULL,
    next_token INTEGER NOT NULL DEFAULT 1 CHECK (next_token >= 1),
    serving_appointment_id TEXT REFERENCES appointments(id),
    version INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (doctor_id, queue_date)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO accounts (id, role, name) VALUES ('ph1', 'pharmacy', 'Corner Pharmacy')",
            [],
        )
        .unwrap();
        conn
    }

    fn insert_appointment(conn: &Connection, id: &str, token: i64, queue_status: &str) -> rusqlite::Result<usize> {
        conn.execute(
            r#"
            INSERT INTO appointments (
                id, patient_id, doctor_id, start_time, queue_date, token_number,
                queue_status, created_at, updated_at
            ) VALUES (?1, 'pat', 'doc', '2026-03-02T09:00:00Z', '2026-03-02', ?2, ?3,
                      '2026-03-01T00:00:00Z', '2026-03-01T00:00:00Z')
            "#,
            rusqlite::params![id, token, queue_status],
        )
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
        // Applying twice is harmless
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_negative_stock_rejected() {
        let conn = setup();
        let result = conn.execute(
            r#"
            INSERT INTO medicines (id, pharmacy_id, name, price, stock, expiry_date, created_at, updated_at)
            VALUES ('m1', 'ph1', 'Paracetamol', 10.0, -1, '2027-01-01', 'x', 'x')
            "#,
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_discount_requires_flag() {
        let conn = setup();
        let result = conn.execute(
            r#"
            INSERT INTO medicines (id, pharmacy_id, name, price, stock, expiry_date,
                                   is_on_marketplace, marketplace_price, created_at, updated_at)
            VALUES ('m1', 'ph1', 'Paracetamol', 10.0, 5, '2027-01-01', 0, 8.0, 'x', 'x')
            "#,
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let conn = setup();
        insert_appointment(&conn, "a1", 1, "waiting").unwrap();
        assert!(insert_appointment(&conn, "a2", 1, "waiting").is_err());
        assert!(insert_appointment(&conn, "a3", 2, "waiting").is_ok());
    }

    #[test]
    fn test_single_serving_per_doctor_day() {
        let conn = setup();
        insert_appointment(&conn, "a1", 1, "serving").unwrap();
        assert!(insert_appointment(&conn, "a2", 2, "serving").is_err());
        assert!(insert_appointment(&conn, "a3", 3, "completed").is_ok());
    }

    #[test]
    fn test_bed_sum_enforced() {
        let conn = setup();
        let result = conn.execute(
            r#"
            INSERT INTO accounts (id, role, name, total_beds, icu_available, nicu_available,
                                  ventilators_available, general_beds_available, beds_available)
            VALUES ('h1', 'hospital', 'City Hospital', 20, 2, 1, 0, 5, 9)
            "#,
            [],
        );
        assert!(result.is_err());
    }
}
