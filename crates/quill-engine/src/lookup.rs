use quill_core::{pick_canonical, SessionKey, SessionRecord};
use quill_store::SessionStore;

use crate::error::Result;

/// Canonical record for `student_id`, ignoring `exclude`.
///
/// Duplicates can exist transiently when two logins race; the most recently
/// updated one wins.
pub async fn find_canonical(
    store: &dyn SessionStore,
    student_id: &str,
    exclude: Option<&SessionKey>,
) -> Result<Option<SessionRecord>> {
    if student_id.trim().is_empty() {
        return Ok(None);
    }
    let records = store.find_by_student(student_id).await?;
    Ok(pick_canonical(
        records
            .into_iter()
            .filter(|r| exclude != Some(&r.session_key)),
    ))
}
