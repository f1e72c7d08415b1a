//! Checking or unchecking every checkbox on a page

use log::debug;

use crate::inspector::InspectorSession;
use crate::{Error, Result};

/// Script that sets every enabled checkbox to `checked`, fires a bubbling
/// `change` event for each one it flips, and returns how many it flipped.
pub fn toggle_script(checked: bool) -> String {
    format!(
        r#"(function(checked) {{
    var boxes = document.querySelectorAll('input[type="checkbox"]:not(:disabled)');
    var changed = 0;
    boxes.forEach(function(box) {{
        if (box.checked !== checked) {{
            box.checked = checked;
            box.dispatchEvent(new Event('change', {{ bubbles: true }}));
            changed++;
        }}
    }});
    return changed;
}})({})"#,
        checked
    )
}

pub(crate) async fn set_all(session: &mut InspectorSession, checked: bool) -> Result<u32> {
    let value = session.evaluate(&toggle_script(checked)).await?;
    let changed = value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| Error::protocol("Runtime.evaluate", format!("expected a count, got {}", value)))?;
    debug!("[{}] set {} checkboxes to {}", session.target(), changed, checked);
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_embeds_target_state() {
        assert!(toggle_script(true).ends_with("})(true)"));
        assert!(toggle_script(false).ends_with("})(false)"));
        assert!(toggle_script(true).contains(":not(:disabled)"));
    }
}
