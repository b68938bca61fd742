//! Applies inbound server messages to the cached presentation.
//!
//! [`reduce`] is a pure function of the previous cache entry and one
//! message. Messages that do not touch the document, and messages that
//! arrive before any full state exists, return the previous entry unchanged
//! (the same `Arc`), so callers can skip change notification with
//! `Arc::ptr_eq`.
//!
//! The cache is server-authoritative: inbound state always overwrites local
//! optimistic edits. The helpers at the bottom are for callers that edit the
//! cache locally before the server confirms.

use std::collections::HashSet;
use std::sync::Arc;

use super::codec::{
    presentation_from_wire, presentation_patch_from_wire, slide_from_wire, slide_patch_from_wire,
};
use super::error::{ConflictInfo, ConflictKind};
use super::protocol::{ServerMessage, SlideOrder, WirePresentation, WireSlide};
use crate::models::{Presentation, Slide, SlidePatch};

pub fn reduce(
    previous: Option<Arc<Presentation>>,
    message: &ServerMessage,
) -> Option<Arc<Presentation>> {
    if let ServerMessage::SyncState {
        presentation,
        slides,
        version,
        ..
    } = message
    {
        let next = presentation_from_wire(presentation, slides, *version, previous.as_deref());
        return Some(Arc::new(next));
    }

    let current = previous?;
    let next = match message {
        ServerMessage::SlideUpdate {
            slide_id,
            changes,
            version,
            ..
        } => update_slide(&current, slide_id, |slide| {
            let mut next = slide.patched(&slide_patch_from_wire(changes));
            if version.is_some() {
                next.version = *version;
            }
            next
        }),
        ServerMessage::SlideCreate { slide, temp_id, .. } => {
            insert_slide(&current, slide, temp_id.as_deref())
        }
        ServerMessage::SlideDelete { slide_id, .. } => remove_slide(&current, slide_id),
        ServerMessage::SlideReorder { slide_orders, .. } => reorder_slides(&current, slide_orders),
        ServerMessage::PresentationUpdate {
            changes, version, ..
        } => {
            let mut next = current.patched(&presentation_patch_from_wire(changes));
            if let Some(version) = version {
                next.version = *version;
            }
            Some(next)
        }
        ServerMessage::ImageGenerating { slide_id, .. } => update_slide(&current, slide_id, |s| {
            let mut next = s.clone();
            next.is_image_loading = true;
            next.image_error = None;
            next
        }),
        ServerMessage::ImageCompleted {
            slide_id,
            image_url,
        } => update_slide(&current, slide_id, |s| {
            let mut next = s.clone();
            next.image_url = Some(image_url.clone());
            next.is_image_loading = false;
            next.image_error = None;
            next
        }),
        ServerMessage::ImageFailed { slide_id, error } => update_slide(&current, slide_id, |s| {
            let mut next = s.clone();
            next.is_image_loading = false;
            next.image_error = Some(error.clone());
            next
        }),
        _ => None,
    };

    match next {
        Some(next) => Some(Arc::new(next)),
        None => Some(current),
    }
}

/// Replaces one slide. `None` if the slide is not cached.
fn update_slide<F>(current: &Presentation, slide_id: &str, apply: F) -> Option<Presentation>
where
    F: FnOnce(&Slide) -> Slide,
{
    let index = current.slide_index(slide_id)?;
    let mut next = current.clone();
    next.slides[index] = apply(&current.slides[index]);
    Some(next)
}

fn insert_slide(current: &Presentation, wire: &WireSlide, temp_id: Option<&str>) -> Option<Presentation> {
    let Some(slide_id) = wire.id.as_deref() else {
        tracing::warn!("Ignoring slide:create without a slide id");
        return None;
    };

    // The creator's optimistic copy is swapped in place. A repeated create
    // for a known id replaces that slide instead of duplicating it.
    let existing = temp_id
        .and_then(|t| current.slide_index(t))
        .or_else(|| current.slide_index(slide_id));

    let mut next = current.clone();
    match existing {
        Some(index) => {
            next.slides[index] = slide_from_wire(wire, Some(&current.slides[index]));
        }
        None => {
            let len = next.slides.len();
            let index = wire.position.map_or(len, |p| (p as usize).min(len));
            next.slides.insert(index, slide_from_wire(wire, None));
        }
    }
    Some(next)
}

fn remove_slide(current: &Presentation, slide_id: &str) -> Option<Presentation> {
    current.slide_index(slide_id)?;
    let mut next = current.clone();
    next.slides.retain(|s| s.id != slide_id);
    Some(next)
}

/// Orders slides by the instruction's positions. Unknown ids are skipped;
/// slides the instruction does not mention keep their relative order after
/// the ordered ones.
fn reorder_slides(current: &Presentation, orders: &[SlideOrder]) -> Option<Presentation> {
    let mut sorted: Vec<&SlideOrder> = orders.iter().collect();
    sorted.sort_by_key(|o| o.new_position);

    let mut placed = HashSet::new();
    let mut slides = Vec::with_capacity(current.slides.len());
    for order in sorted {
        if !placed.insert(order.slide_id.as_str()) {
            continue;
        }
        match current.slide(&order.slide_id) {
            Some(slide) => slides.push(slide.clone()),
            None => tracing::debug!("Reorder names unknown slide {}", order.slide_id),
        }
    }
    slides.extend(
        current
            .slides
            .iter()
            .filter(|s| !placed.contains(s.id.as_str()))
            .cloned(),
    );

    if slides.iter().map(|s| &s.id).eq(current.slides.iter().map(|s| &s.id)) {
        return None;
    }
    let mut next = current.clone();
    next.slides = slides;
    Some(next)
}

/// Applies a local edit to the cache ahead of the server's confirmation.
pub fn apply_local_slide_patch(current: &Presentation, slide_id: &str, patch: &SlidePatch) -> Presentation {
    current.with_slide_patch(slide_id, patch)
}

/// Inserts an optimistic slide under its temporary id.
pub fn insert_local_slide(current: &Presentation, position: usize, slide: Slide) -> Presentation {
    let mut next = current.clone();
    let index = position.min(next.slides.len());
    next.slides.insert(index, slide);
    next
}

/// Renames an optimistic slide to the id the server assigned. If the
/// server's `slide:create` broadcast already replaced it, nothing changes.
pub fn confirm_created_slide(current: &Presentation, temp_id: &str, server_id: &str) -> Presentation {
    let mut next = current.clone();
    if next.slide_index(server_id).is_some() {
        next.slides.retain(|s| s.id != temp_id);
        return next;
    }
    if let Some(slide) = next.slides.iter_mut().find(|s| s.id == temp_id) {
        slide.id = server_id.to_string();
    }
    next
}

/// Replaces the conflicting slide or metadata with the server's copy from a
/// conflict rejection.
pub fn adopt_conflict_state(current: &Presentation, conflict: &ConflictInfo) -> Presentation {
    let mut next = current.clone();
    let state_id = conflict.server_state.get("id").and_then(|v| v.as_str());

    if let Some(index) = state_id.and_then(|id| current.slide_index(id)) {
        if conflict.kind == ConflictKind::Deleted {
            next.slides.remove(index);
            return next;
        }
        match serde_json::from_value::<WireSlide>(conflict.server_state.clone()) {
            Ok(wire) => {
                let mut slide = slide_from_wire(&wire, Some(&current.slides[index]));
                slide.version = wire.version.or(Some(conflict.server_version));
                next.slides[index] = slide;
            }
            Err(e) => tracing::warn!("Unreadable conflict state for slide: {}", e),
        }
        return next;
    }

    if state_id == Some(current.id.as_str()) {
        match serde_json::from_value::<WirePresentation>(conflict.server_state.clone()) {
            Ok(wire) => {
                let slides = std::mem::take(&mut next.slides);
                next = presentation_from_wire(&wire, &[], conflict.server_version, None);
                next.slides = slides;
                next.version = conflict.server_version;
            }
            Err(e) => tracing::warn!("Unreadable conflict state for presentation: {}", e),
        }
    }
    next
}
