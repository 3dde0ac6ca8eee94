//! Lane-group kernels over a small buffer of at most `simdlen` values.
//!
//! Both kernels only rely on associativity: every combine takes its left
//! operand from lower lanes, so user operators that do not commute still
//! see iteration order.

use crate::operator::Combiner;

/// Order-preserving pairwise reduction of one lane buffer.
///
/// Equal to `op.fold(lanes)`; a single lane still passes through one
/// combine with the identity. The buffer is used as scratch space.
pub fn tree_reduce<T: Copy>(lanes: &mut [T], op: &Combiner<T>) -> T {
    let mut width = lanes.len();
    match width {
        0 => return op.identity(),
        1 => return op.combine(op.identity(), lanes[0]),
        _ => {}
    }
    while width > 1 {
        let pairs = width / 2;
        for k in 0..pairs {
            lanes[k] = op.combine(lanes[2 * k], lanes[2 * k + 1]);
        }
        if width % 2 == 1 {
            lanes[pairs] = lanes[width - 1];
            width = pairs + 1;
        } else {
            width = pairs;
        }
    }
    lanes[0]
}

/// In-place inclusive scan in `ceil(log2(len))` shifted steps.
pub fn inclusive_scan<T: Copy>(lanes: &mut [T], op: &Combiner<T>) {
    let len = lanes.len();
    let mut shift = 1;
    while shift < len {
        // Walk downwards so lanes[k - shift] still holds the previous step.
        for k in (shift..len).rev() {
            lanes[k] = op.combine(lanes[k - shift], lanes[k]);
        }
        shift *= 2;
    }
}
