//! Guest OS end-of-life policy.
//!
//! Versions are looked up in a static table of end-of-standard-support
//! dates. Versions missing from the table are treated as supported, so a
//! release newer than the table never raises a warning. That default hides
//! real end-of-life for uncatalogued releases; revisit it together with the
//! table when new releases ship.

use chrono::NaiveDate;

/// End-of-support entry for one OS version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EolRecord {
    /// Version identifier as reported by `VERSION_ID`.
    pub version: &'static str,
    /// First day the version is no longer supported.
    pub end_of_support: (i32, u32, u32),
}

impl EolRecord {
    /// End-of-support as a date.
    pub fn date(&self) -> Option<NaiveDate> {
        let (y, m, d) = self.end_of_support;
        NaiveDate::from_ymd_opt(y, m, d)
    }
}

const fn record(version: &'static str, y: i32, m: u32, d: u32) -> EolRecord {
    EolRecord {
        version,
        end_of_support: (y, m, d),
    }
}

/// Ubuntu and Debian releases with their end of standard security support.
pub const EOL_TABLE: &[EolRecord] = &[
    // Ubuntu LTS
    record("12.04", 2017, 4, 28),
    record("14.04", 2019, 4, 25),
    record("16.04", 2021, 4, 30),
    record("18.04", 2023, 5, 31),
    record("20.04", 2025, 5, 31),
    record("22.04", 2027, 6, 1),
    record("24.04", 2029, 5, 31),
    // Ubuntu interim
    record("20.10", 2021, 7, 22),
    record("21.04", 2022, 1, 20),
    record("21.10", 2022, 7, 14),
    record("22.10", 2023, 7, 20),
    record("23.04", 2024, 1, 25),
    record("23.10", 2024, 7, 11),
    record("24.10", 2025, 7, 10),
    record("25.04", 2026, 1, 15),
    // Debian
    record("9", 2020, 7, 6),
    record("10", 2022, 9, 10),
    record("11", 2024, 8, 14),
    record("12", 2026, 6, 10),
];

/// End-of-support date for `version`, if catalogued.
///
/// Point releases resolve to their series: `20.04.6` looks up `20.04`.
pub fn end_of_support(version: &str) -> Option<NaiveDate> {
    let version = version.trim().trim_matches('"');
    if version.is_empty() {
        return None;
    }

    let series: Vec<&str> = version.splitn(3, '.').take(2).collect();
    let series = series.join(".");

    [version, series.as_str()]
        .iter()
        .find_map(|candidate| EOL_TABLE.iter().find(|r| r.version == *candidate))
        .and_then(EolRecord::date)
}

/// Whether `version` is end-of-life on `reference_date`.
///
/// True iff the version is catalogued and `reference_date` is on or after
/// its end-of-support date. Uncatalogued versions are never end-of-life.
pub fn is_eol(version: &str, reference_date: NaiveDate) -> bool {
    end_of_support(version).is_some_and(|eol| reference_date >= eol)
}

/// Local current date, the reference date for interactive checks.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
