use std::fmt::Write;

/// Backing SQL engines with a shipped syntax profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    SqlServer,
    Sqlite,
    MySql,
    Postgres,
    Oracle,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::SqlServer,
        Dialect::Sqlite,
        Dialect::MySql,
        Dialect::Postgres,
        Dialect::Oracle,
    ];

    pub fn profile(self) -> &'static DialectProfile {
        match self {
            Dialect::SqlServer => &SQL_SERVER,
            Dialect::Sqlite => &SQLITE,
            Dialect::MySql => &MYSQL,
            Dialect::Postgres => &POSTGRES,
            Dialect::Oracle => &ORACLE,
        }
    }
}

/// How a dialect spells the pagination clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `OFFSET n ROWS FETCH NEXT m ROWS ONLY`
    OffsetFetch,
    /// `LIMIT n,m`
    LimitOffset,
    /// `OFFSET n LIMIT m`
    OffsetLimit,
}

/// How the generated key of an identity insert is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRetrieval {
    /// Trailing scalar-returning statement appended after the insert.
    TrailingSelect(&'static str),
    /// `RETURNING <identity>` clause on the insert itself.
    Returning,
    /// `RETURNING <identity> INTO :pN` bound to an output parameter.
    ReturningInto,
}

/// Immutable syntax-fact table for one engine. Pure data: the lowering logic
/// is shared, profiles differ only in templates and limits.
#[derive(Debug)]
pub struct DialectProfile {
    pub dialect: Dialect,
    pub quote_open: char,
    pub quote_close: char,
    /// Placeholder prefix, completed with the 0-based parameter index.
    pub param_prefix: &'static str,
    pub pagination: Pagination,
    /// Spelling of "all remaining rows" when the dialect's LIMIT form cannot
    /// simply be omitted (offset > 0, fetch unbounded).
    pub limit_all: &'static str,
    pub identity: IdentityRetrieval,
    pub max_batch_rows: usize,
    pub max_batch_params: usize,
    /// Multi-row inserts are emitted as `UNION ALL SELECT … FROM DUAL`
    /// instead of a multi-row VALUES list.
    pub union_all_values: bool,
    pub terminator: &'static str,
    /// Intrinsic function spellings, keyed by lowercase canonical name.
    /// Zero-argument intrinsics are spelled verbatim (e.g. `SYSDATE`).
    pub functions: &'static [(&'static str, &'static str)],
}

impl DialectProfile {
    pub fn quote(&self, out: &mut String, identifier: &str) {
        out.push(self.quote_open);
        for c in identifier.chars() {
            out.push(c);
            if c == self.quote_close {
                out.push(c);
            }
        }
        out.push(self.quote_close);
    }

    pub fn placeholder(&self, out: &mut String, index: usize) {
        out.push_str(self.param_prefix);
        let _ = write!(out, "{}", index);
    }

    pub fn param_name(&self, index: usize) -> String {
        format!("{}{}", self.param_prefix, index)
    }

    pub fn function(&self, name: &str) -> Option<&'static str> {
        self.functions
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, spelling)| *spelling)
    }
}

pub static SQL_SERVER: DialectProfile = DialectProfile {
    dialect: Dialect::SqlServer,
    quote_open: '[',
    quote_close: ']',
    param_prefix: "@p",
    pagination: Pagination::OffsetFetch,
    limit_all: "",
    identity: IdentityRetrieval::TrailingSelect("SELECT SCOPE_IDENTITY()"),
    max_batch_rows: 1000,
    max_batch_params: 2100,
    union_all_values: false,
    terminator: ";",
    functions: &[
        ("len", "LEN"),
        ("substring", "SUBSTRING"),
        ("upper", "UPPER"),
        ("lower", "LOWER"),
        ("trim", "TRIM"),
        ("abs", "ABS"),
        ("round", "ROUND"),
        ("now", "GETDATE()"),
        ("count", "COUNT"),
        ("sum", "SUM"),
        ("avg", "AVG"),
        ("min", "MIN"),
        ("max", "MAX"),
        ("coalesce", "COALESCE"),
    ],
};

pub static SQLITE: DialectProfile = DialectProfile {
    dialect: Dialect::Sqlite,
    quote_open: '[',
    quote_close: ']',
    param_prefix: "@p",
    pagination: Pagination::LimitOffset,
    limit_all: "-1",
    identity: IdentityRetrieval::TrailingSelect("SELECT LAST_INSERT_ROWID()"),
    max_batch_rows: 5000,
    max_batch_params: 999,
    union_all_values: false,
    terminator: ";",
    functions: &[
        ("len", "LENGTH"),
        ("substring", "SUBSTR"),
        ("upper", "UPPER"),
        ("lower", "LOWER"),
        ("trim", "TRIM"),
        ("abs", "ABS"),
        ("round", "ROUND"),
        ("now", "DATETIME('now')"),
        ("count", "COUNT"),
        ("sum", "SUM"),
        ("avg", "AVG"),
        ("min", "MIN"),
        ("max", "MAX"),
        ("coalesce", "COALESCE"),
    ],
};

pub static MYSQL: DialectProfile = DialectProfile {
    dialect: Dialect::MySql,
    quote_open: '`',
    quote_close: '`',
    param_prefix: "@p",
    pagination: Pagination::LimitOffset,
    limit_all: "18446744073709551615",
    identity: IdentityRetrieval::TrailingSelect("SELECT LAST_INSERT_ID()"),
    max_batch_rows: 5000,
    max_batch_params: 3000,
    union_all_values: false,
    terminator: ";",
    functions: &[
        ("len", "LENGTH"),
        ("substring", "SUBSTRING"),
        ("upper", "UPPER"),
        ("lower", "LOWER"),
        ("trim", "TRIM"),
        ("abs", "ABS"),
        ("round", "ROUND"),
        ("now", "NOW()"),
        ("count", "COUNT"),
        ("sum", "SUM"),
        ("avg", "AVG"),
        ("min", "MIN"),
        ("max", "MAX"),
        ("coalesce", "COALESCE"),
    ],
};

pub static POSTGRES: DialectProfile = DialectProfile {
    dialect: Dialect::Postgres,
    quote_open: '"',
    quote_close: '"',
    param_prefix: "@p",
    pagination: Pagination::OffsetLimit,
    limit_all: "",
    identity: IdentityRetrieval::Returning,
    max_batch_rows: 5000,
    max_batch_params: 3000,
    union_all_values: false,
    terminator: ";",
    functions: &[
        ("len", "LENGTH"),
        ("substring", "SUBSTRING"),
        ("upper", "UPPER"),
        ("lower", "LOWER"),
        ("trim", "TRIM"),
        ("abs", "ABS"),
        ("round", "ROUND"),
        ("now", "NOW()"),
        ("count", "COUNT"),
        ("sum", "SUM"),
        ("avg", "AVG"),
        ("min", "MIN"),
        ("max", "MAX"),
        ("coalesce", "COALESCE"),
    ],
};

pub static ORACLE: DialectProfile = DialectProfile {
    dialect: Dialect::Oracle,
    quote_open: '"',
    quote_close: '"',
    param_prefix: ":p",
    pagination: Pagination::OffsetFetch,
    limit_all: "",
    identity: IdentityRetrieval::ReturningInto,
    max_batch_rows: 500,
    max_batch_params: 999,
    union_all_values: true,
    terminator: ";",
    functions: &[
        ("len", "LENGTH"),
        ("substring", "SUBSTR"),
        ("upper", "UPPER"),
        ("lower", "LOWER"),
        ("trim", "TRIM"),
        ("abs", "ABS"),
        ("round", "ROUND"),
        ("now", "SYSDATE"),
        ("count", "COUNT"),
        ("sum", "SUM"),
        ("avg", "AVG"),
        ("min", "MIN"),
        ("max", "MAX"),
        ("coalesce", "COALESCE"),
    ],
};
