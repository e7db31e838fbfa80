//! CLI exit code registry.
//!
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Run committed, or dry run finished without failure  |
//! | 1    | Unexpected failure (e.g. output serialization)      |
//! | 2    | Usage error (reported by clap)                      |
//! | 3    | Protection violation; nothing was changed           |
//! | 4    | Store unavailable, delete or transaction failure    |
//! | 5    | Database could not be opened or migrated            |
//! | 6    | Logging could not be initialized                    |

use posmerge_core::MergeError;

/// Success.
pub const EXIT_SUCCESS: u8 = 0;

/// Unexpected failure outside the merge run itself.
pub const EXIT_ERROR: u8 = 1;

/// A deletion candidate was an admin position.
pub const EXIT_PROTECTION_VIOLATION: u8 = 3;

/// The store failed while listing, deleting or committing.
pub const EXIT_STORE_FAILURE: u8 = 4;

/// Opening or migrating the database failed.
pub const EXIT_DB_OPEN: u8 = 5;

/// Logging bootstrap failed.
pub const EXIT_LOGGING: u8 = 6;

/// Maps a failed run to its exit code.
pub fn merge_exit_code(error: &MergeError) -> u8 {
    match error {
        MergeError::ProtectionViolation(_) => EXIT_PROTECTION_VIOLATION,
        MergeError::StoreUnavailable(_)
        | MergeError::DeleteFailed { .. }
        | MergeError::TransactionFailed(_) => EXIT_STORE_FAILURE,
    }
}
