//! Area-selection sessions
//!
//! A page view has at most one live selection at a time. The session handle
//! owns that slot: it tracks the pointer drag, turns it into a
//! [`SelectionArea`], and frees the view when it is finished, cancelled or
//! dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Error, Result, SelectionArea, TargetId};

/// Drags must exceed this many CSS pixels in both directions to count.
pub const MIN_SELECTION_EXTENT: f64 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct SelectionRegistry {
    active: Arc<Mutex<HashSet<TargetId>>>,
}

impl SelectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start selecting on `view`; fails if a selection is already active there.
    pub fn begin(&self, view: &TargetId) -> Result<SelectionSession> {
        if !lock(&self.active).insert(view.clone()) {
            return Err(Error::SelectionActive(view.to_string()));
        }
        Ok(SelectionSession {
            view: view.clone(),
            active: Arc::clone(&self.active),
            anchor: None,
            pointer: None,
        })
    }

    pub fn is_active(&self, view: &TargetId) -> bool {
        lock(&self.active).contains(view)
    }
}

/// One in-progress drag on one page view
#[derive(Debug)]
pub struct SelectionSession {
    view: TargetId,
    active: Arc<Mutex<HashSet<TargetId>>>,
    anchor: Option<(f64, f64)>,
    pointer: Option<(f64, f64)>,
}

impl SelectionSession {
    pub fn view(&self) -> &TargetId {
        &self.view
    }

    /// Pointer pressed: start a new rectangle.
    pub fn press(&mut self, x: f64, y: f64) {
        self.anchor = Some((x, y));
        self.pointer = Some((x, y));
    }

    /// Pointer moved; ignored until pressed.
    pub fn drag(&mut self, x: f64, y: f64) {
        if self.anchor.is_some() {
            self.pointer = Some((x, y));
        }
    }

    /// The rectangle currently spanned by the drag, normalized.
    pub fn current(&self) -> Option<SelectionArea> {
        let (ax, ay) = self.anchor?;
        let (px, py) = self.pointer?;
        Some(SelectionArea {
            x: ax.min(px),
            y: ay.min(py),
            width: (px - ax).abs(),
            height: (py - ay).abs(),
        })
    }

    /// Pointer released: end the session. Yields the area only if it is
    /// larger than [`MIN_SELECTION_EXTENT`] both ways.
    pub fn release(mut self, x: f64, y: f64) -> Option<SelectionArea> {
        self.drag(x, y);
        self.current()
            .filter(|a| a.width > MIN_SELECTION_EXTENT && a.height > MIN_SELECTION_EXTENT)
    }

    /// Abandon the selection (Escape).
    pub fn cancel(self) {}
}

impl Drop for SelectionSession {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.view);
    }
}

fn lock(set: &Mutex<HashSet<TargetId>>) -> MutexGuard<'_, HashSet<TargetId>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_selection_per_view() {
        let reg = SelectionRegistry::new();
        let view = TargetId::from("7");
        let session = reg.begin(&view).unwrap();
        assert!(matches!(reg.begin(&view), Err(Error::SelectionActive(_))));
        assert!(reg.begin(&TargetId::from("8")).is_ok());
        session.cancel();
        assert!(!reg.is_active(&view));
        assert!(reg.begin(&view).is_ok());
    }

    #[test]
    fn drag_up_and_left_is_normalized() {
        let reg = SelectionRegistry::new();
        let mut s = reg.begin(&TargetId::from("1")).unwrap();
        s.press(100.0, 80.0);
        s.drag(60.0, 90.0);
        let area = s.release(40.0, 20.0).unwrap();
        assert_eq!(area, SelectionArea::new(40.0, 20.0, 60.0, 60.0));
        assert!(!reg.is_active(&TargetId::from("1")));
    }

    #[test]
    fn tiny_drags_yield_nothing() {
        let reg = SelectionRegistry::new();
        let mut s = reg.begin(&TargetId::from("1")).unwrap();
        s.press(0.0, 0.0);
        assert_eq!(s.release(10.0, 50.0), None);
    }

    #[test]
    fn moves_before_press_are_ignored() {
        let reg = SelectionRegistry::new();
        let mut s = reg.begin(&TargetId::from("1")).unwrap();
        s.drag(5.0, 5.0);
        assert!(s.current().is_none());
    }
}
