use super::{Migration, SimpleSqlMigration};

pub fn migration() -> impl Migration {
    SimpleSqlMigration {
        serial_number: 0,
        sql: vec![
            // Balances and cashback amounts are tenths of the currency unit, prices are cents.
            r#"
            CREATE TABLE users (
                id UUID PRIMARY KEY,
                phone_number TEXT UNIQUE NOT NULL,
                name TEXT,
                role TEXT NOT NULL CHECK (role IN ('CLIENT', 'ADMIN')),
                password_hash TEXT,
                balance_tenths BIGINT NOT NULL CHECK (balance_tenths >= 0),
                created TIMESTAMP WITH TIME ZONE NOT NULL
            )"#,
            r#"CREATE INDEX user_name ON users (LOWER(name))"#,
            r#"
            CREATE TABLE otp_tokens (
                id UUID PRIMARY KEY,
                phone_number TEXT NOT NULL,
                code TEXT NOT NULL,
                expires TIMESTAMP WITH TIME ZONE NOT NULL,
                is_used BOOLEAN NOT NULL,
                created TIMESTAMP WITH TIME ZONE NOT NULL
            )"#,
            r#"CREATE INDEX otp_token_phone_number ON otp_tokens (phone_number, created)"#,
            r#"
            CREATE TABLE auth_tokens (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users,
                token_hash TEXT UNIQUE NOT NULL,
                created TIMESTAMP WITH TIME ZONE NOT NULL,
                expires TIMESTAMP WITH TIME ZONE NOT NULL
            )"#,
            r#"
            CREATE TABLE transactions (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users,
                product_id TEXT NOT NULL,
                product_name TEXT NOT NULL,
                product_price_cents BIGINT NOT NULL,
                catalog_price_cents BIGINT,
                cashback_tenths BIGINT NOT NULL,
                balance_before_tenths BIGINT NOT NULL,
                balance_after_tenths BIGINT NOT NULL,
                payment_type TEXT,
                created TIMESTAMP WITH TIME ZONE NOT NULL,
                CHECK (balance_after_tenths = balance_before_tenths + cashback_tenths)
            )"#,
            r#"CREATE INDEX transaction_user_created ON transactions (user_id, created)"#,
            r#"
            CREATE TABLE products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                price_cents BIGINT NOT NULL,
                description TEXT,
                category TEXT
            )"#,
        ],
    }
}
