//! Embedded KotOR routine table.

use crate::RoutineTable;
use std::sync::OnceLock;

const K1_NWSCRIPT: &str = include_str!("../data/k1_nwscript.nss");

/// The embedded table, parsed once on first use.
///
/// # Panics
///
/// Panics if the embedded declarations fail to parse.
pub(crate) fn table() -> &'static RoutineTable {
    static TABLE: OnceLock<RoutineTable> = OnceLock::new();
    TABLE.get_or_init(|| match RoutineTable::from_nss(K1_NWSCRIPT) {
        Ok(table) => table,
        Err(err) => panic!("embedded nwscript.nss is malformed: {err}"),
    })
}
