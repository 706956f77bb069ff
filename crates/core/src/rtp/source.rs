//! Per-source sequence validation and loss accounting (RFC 3550 A.1, A.3).

/// Consecutive packets required before a new source is trusted.
pub const MIN_SEQUENTIAL: u32 = 2;
/// Largest forward jump still treated as in-order.
pub const MAX_DROPOUT: u16 = 3000;
/// Largest backward step treated as reordering rather than a restart.
pub const MAX_MISORDER: u32 = 100;
pub const RTP_SEQ_MOD: u32 = 1 << 16;

/// Sequence state of one remote RTP source.
///
/// Create it from the first packet's sequence number, then pass every
/// packet, the first one included, to [`update`](Self::update).
#[derive(Debug, Clone)]
pub struct SourceState {
    max_seq: u16,
    /// Sequence wraps, already shifted by 16 bits.
    cycles: u32,
    base_seq: u32,
    /// `RTP_SEQ_MOD + 1` when no restart is suspected.
    bad_seq: u32,
    probation: u32,
    received: u32,
    expected_prior: u32,
    received_prior: u32,
}

/// Loss figures for one reception report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossReport {
    /// Fraction lost since the previous report, in 1/256 units.
    pub fraction_lost: u8,
    /// Cumulative loss, clamped to 24-bit signed.
    pub cumulative_lost: i32,
    pub extended_max_seq: u32,
}

impl SourceState {
    pub fn new(seq: u16) -> Self {
        let mut source = Self {
            max_seq: 0,
            cycles: 0,
            base_seq: 0,
            bad_seq: RTP_SEQ_MOD + 1,
            probation: MIN_SEQUENTIAL,
            received: 0,
            expected_prior: 0,
            received_prior: 0,
        };
        source.init_seq(seq);
        source.max_seq = seq.wrapping_sub(1);
        source
    }

    fn init_seq(&mut self, seq: u16) {
        self.base_seq = u32::from(seq);
        self.max_seq = seq;
        self.bad_seq = RTP_SEQ_MOD + 1;
        self.cycles = 0;
        self.received = 0;
        self.received_prior = 0;
        self.expected_prior = 0;
    }

    /// Account for a packet with sequence number `seq`.
    ///
    /// Returns `false` while the source is on probation, and for a packet
    /// that looks like the start of a restart.
    pub fn update(&mut self, seq: u16) -> bool {
        let udelta = seq.wrapping_sub(self.max_seq);

        if self.probation > 0 {
            if seq == self.max_seq.wrapping_add(1) {
                self.probation -= 1;
                self.max_seq = seq;
                if self.probation == 0 {
                    self.init_seq(seq);
                    self.received += 1;
                    return true;
                }
            } else {
                self.probation = MIN_SEQUENTIAL - 1;
                self.max_seq = seq;
            }
            return false;
        } else if udelta < MAX_DROPOUT {
            if seq < self.max_seq {
                self.cycles = self.cycles.wrapping_add(RTP_SEQ_MOD);
            }
            self.max_seq = seq;
        } else if u32::from(udelta) < RTP_SEQ_MOD - MAX_MISORDER {
            if u32::from(seq) == self.bad_seq {
                // Two sequential packets after a big jump: the sender restarted.
                self.init_seq(seq);
            } else {
                self.bad_seq = (u32::from(seq) + 1) & (RTP_SEQ_MOD - 1);
                return false;
            }
        }
        self.received += 1;
        true
    }

    pub fn is_valid(&self) -> bool {
        self.probation == 0
    }

    pub fn max_seq(&self) -> u16 {
        self.max_seq
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn extended_max_seq(&self) -> u32 {
        self.cycles.wrapping_add(u32::from(self.max_seq))
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn expected(&self) -> u32 {
        self.extended_max_seq()
            .wrapping_sub(self.base_seq)
            .wrapping_add(1)
    }

    /// Cumulative packets lost, clamped to the 24-bit report field.
    pub fn cumulative_lost(&self) -> i32 {
        let lost = i64::from(self.expected()) - i64::from(self.received);
        lost.clamp(-0x80_0000, 0x7F_FFFF) as i32
    }

    /// Close a reporting interval and compute its loss figures.
    pub fn report(&mut self) -> LossReport {
        let expected = self.expected();
        let expected_interval = expected.wrapping_sub(self.expected_prior);
        self.expected_prior = expected;
        let received_interval = self.received.wrapping_sub(self.received_prior);
        self.received_prior = self.received;
        let lost_interval = i64::from(expected_interval) - i64::from(received_interval);

        let fraction_lost = if expected_interval == 0 || lost_interval <= 0 {
            0
        } else {
            ((lost_interval << 8) / i64::from(expected_interval)).min(255) as u8
        };
        LossReport {
            fraction_lost,
            cumulative_lost: self.cumulative_lost(),
            extended_max_seq: self.extended_max_seq(),
        }
    }
}
