//! Transition Period recognition.
//!
//! The recogniser scans the classified stream for a window matching
//!
//! ```text
//! QCC* · JUMP+ · SLOPE* · TAIL*
//! ```
//!
//! independently on the voltage and current channels, then reconciles the
//! two. The anchor is the inspection point `INSPECT_OFFSET` behind the ring
//! head; a candidate exists only when the anchor carries a JUMP on either
//! channel. A grammar irregularity is folded into an adjacent group, unless
//! the corresponding "strong" policy switch turns it into a disqualifier.

use packwatch_core::{ClassMask, Config, DiagnosticCode, DiagnosticLog, SampleRing};

use crate::entry::TpEntry;

/// Outcome of one recogniser scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scan {
    /// The anchor sample carries no JUMP; nothing was examined.
    NoJump,
    /// A candidate was examined and rejected; entry counts may be partial.
    Rejected,
    /// The entry describes a completed Transition Period.
    Completed,
}

/// Which channel a counting pass walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    Voltage,
    Current,
}

/// Examine the inspection anchor for a complete TP.
///
/// On [`Scan::Completed`] the entry holds the reconciled group counts and
/// `completed` is set; sample copy-out and endpoint work belong to the
/// characteriser. On [`Scan::Rejected`] the partial counts stay in the
/// entry so the caller can size its debounce.
pub fn scan(
    config: &Config,
    ring: &SampleRing,
    n: u64,
    entry: &mut TpEntry,
    diag: &mut DiagnosticLog,
) -> Scan {
    let anchor = ring.at(n, 0);
    if !anchor.class_union().intersects(ClassMask::JUMP) {
        return Scan::NoJump;
    }
    let anchor_time = anchor.time_us;

    entry.reset();

    // The jump must be preceded by a quiet window.
    let mut forbidden = ClassMask::TIME_BREAK | ClassMask::JUMP;
    if config.flags.strong_qcc {
        forbidden |= ClassMask::SLOPE;
    }
    for offset in 1..=config.qcc_len as i64 {
        if ring.at(n, -offset).class_union().intersects(forbidden) {
            return Scan::Rejected;
        }
    }

    if count_channel(config, ring, n, Channel::Voltage, entry, diag).is_err() {
        return Scan::Rejected;
    }
    debug_assert_eq!(entry.total, entry.v.total());

    if count_channel(config, ring, n, Channel::Current, entry, diag).is_err() {
        return Scan::Rejected;
    }

    if entry.v.jump == 0 || entry.i.jump == 0 {
        return Scan::Rejected;
    }

    // Reconcile the two channels: pad the shorter one with trailing tail.
    let count_i = entry.i.total();
    if entry.total > count_i {
        entry.i.tail += entry.total - count_i;
    } else if entry.total < count_i {
        entry.v.tail += count_i - entry.total;
        entry.total = count_i;
    }

    if config.flags.slope_must_exist && entry.v.slope == 0 {
        diag.record(DiagnosticCode::SlopeMissing, "recognize", anchor_time);
        return Scan::Rejected;
    }

    if config.flags.align_slopes
        && (entry.v.qcc as i32 - entry.i.qcc as i32).abs() <= 1
        && entry.v.lead() < entry.i.lead()
    {
        let delta = entry.i.lead() - entry.v.lead();
        if entry.v.slope < delta || entry.v.tail < delta {
            diag.record(DiagnosticCode::CannotAlign, "recognize", anchor_time);
            return Scan::Rejected;
        }
        entry.v.jump += delta;
        entry.v.tail -= delta;
    }

    entry.completed = true;
    Scan::Completed
}

/// Debounce after an examined candidate: one tick plus however far the
/// recognised lead (QCC + jump) reaches past the quiet window, so the same
/// TP is not re-examined. A scan that never examined a candidate costs
/// nothing.
pub fn skip_advance(config: &Config, entry: &TpEntry, scan: Scan) -> u64 {
    match scan {
        Scan::NoJump => 0,
        Scan::Rejected | Scan::Completed => {
            let lead = entry.v.lead().max(entry.i.lead()) as u64;
            1 + lead.saturating_sub(config.qcc_len as u64)
        }
    }
}

fn count_channel(
    config: &Config,
    ring: &SampleRing,
    n: u64,
    channel: Channel,
    entry: &mut TpEntry,
    diag: &mut DiagnosticLog,
) -> Result<(), ()> {
    let anchor_time = ring.at(n, 0).time_us;
    let from = -(config.qcc_len as i64);
    let to = config.tp_len_max as i64 - config.qcc_len as i64;
    let mut first_jump = ClassMask::NONE;

    for offset in from..to {
        let sample = ring.at(n, offset);
        let mask = match channel {
            Channel::Voltage => sample.vclass,
            Channel::Current => sample.iclass,
        };
        let counts = match channel {
            Channel::Voltage => &mut entry.v,
            Channel::Current => &mut entry.i,
        };

        // A break anywhere inside the window invalidates the candidate.
        // Checked once, on the voltage pass.
        if channel == Channel::Voltage
            && sample.class_union().intersects(ClassMask::TIME_BREAK)
        {
            diag.record(DiagnosticCode::TimeBreak, "recognize", anchor_time);
            return Err(());
        }

        let jump = mask.jump_bits();
        if !jump.is_empty() {
            if counts.jump == 0 {
                first_jump = jump;
            } else if config.flags.strong_jump && first_jump != jump {
                diag.record(
                    DiagnosticCode::JumpDirectionConflict,
                    "recognize",
                    anchor_time,
                );
                return Err(());
            }
            if counts.tail > 0 {
                if config.flags.strong_tail {
                    diag.record(DiagnosticCode::JumpInTail, "recognize", anchor_time);
                    return Err(());
                }
                // A jump after tail samples counts as one more tail sample.
                counts.jump -= 1;
                counts.tail += 1;
            }
            if counts.slope > 0 {
                if config.flags.strong_jump_slope {
                    diag.record(DiagnosticCode::SlopeInJump, "recognize", anchor_time);
                    return Err(());
                }
                counts.jump += counts.slope;
                counts.slope = 0;
            }
            counts.jump += 1;
        } else if counts.jump == 0 {
            counts.qcc += 1;
        } else if mask.intersects(ClassMask::SLOPE) {
            if config.flags.strong_slope
                && ((mask.intersects(ClassMask::SLOPE_DROP)
                    && first_jump.intersects(ClassMask::JUMP_RISE))
                    || (mask.intersects(ClassMask::SLOPE_RISE)
                        && first_jump.intersects(ClassMask::JUMP_DROP)))
            {
                diag.record(
                    DiagnosticCode::SlopeDirectionConflict,
                    "recognize",
                    anchor_time,
                );
                return Err(());
            }
            if config.flags.strong_slope_tail || counts.tail == 0 {
                counts.slope += counts.tail;
                counts.tail = 0;
                counts.slope += 1;
            } else if config.flags.strong_d_right {
                diag.record(DiagnosticCode::SlopeInTail, "recognize", anchor_time);
                return Err(());
            } else {
                counts.tail += 1;
            }
        } else {
            if counts.tail >= config.tail_len_min as u8 {
                break;
            }
            counts.tail += 1;
        }

        if channel == Channel::Voltage {
            entry.total += 1;
        }
    }
    Ok(())
}
