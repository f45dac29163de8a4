//! Splitting a budget of `k` recommendations across ranked approaches.

/// Slots per approach, in the order of `scores`.
///
/// Each approach with a positive score gets `ceil(score / total * k)` slots, at
/// least one, capped so that the remaining positive approaches can still get one
/// slot each while the budget lasts. Approaches with a zero or negative score get
/// nothing. Whatever is left after rounding goes to the first positive approach,
/// so the slots always add up to `k`. With no positive score at all, the first
/// approach takes the whole budget.
pub fn allocate_slots(scores: &[f64], k: usize) -> Vec<usize> {
    let mut slots = vec![0; scores.len()];
    if scores.is_empty() || k == 0 {
        return slots;
    }

    let total: f64 = scores.iter().filter(|&&s| s > 0.0).sum();
    let Some(first_positive) = scores.iter().position(|&s| s > 0.0) else {
        slots[0] = k;
        return slots;
    };

    let mut active_after = scores.iter().filter(|&&s| s > 0.0).count();
    let mut left = k;
    for (slot, &score) in slots.iter_mut().zip(scores) {
        if score <= 0.0 {
            continue;
        }
        active_after -= 1;
        if left == 0 {
            continue;
        }
        let reserve = active_after.min(left - 1);
        let share = (score / total * k as f64).ceil() as usize;
        *slot = share.max(1).min(left - reserve);
        left -= *slot;
    }

    slots[first_positive] += left;
    slots
}

/// Leading candidates to skip before taking `slots` items.
///
/// Lists that fit in their budget are taken whole; otherwise the list is rotated
/// by the approach's most common hit rank minus one.
pub fn rotation_offset(candidates: usize, slots: usize, mcv: usize) -> usize {
    if candidates <= slots {
        0
    } else {
        mcv.saturating_sub(1)
    }
}
