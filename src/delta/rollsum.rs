//! rolling checksum used during delta generation to estimate how much of a
//! candidate source object's content reappears in a target object, the way
//! rsync's weak checksum is used to locate matching blocks before doing the
//! expensive byte-exact comparison.
//!
//! this is a coverage *estimator*, not a full rsync block-matcher: it's
//! only used to decide whether a bsdiff against a given source is worth
//! attempting at all.

const WINDOW: usize = 64;
const MODULUS: u32 = 1 << 16;

/// Adler-style rolling checksum over a fixed-size window.
struct RollingChecksum {
    a: u32,
    b: u32,
    window: std::collections::VecDeque<u8>,
}

impl RollingChecksum {
    fn new() -> Self {
        Self {
            a: 0,
            b: 0,
            window: std::collections::VecDeque::with_capacity(WINDOW),
        }
    }

    fn push(&mut self, byte: u8) -> Option<u32> {
        self.window.push_back(byte);
        self.a = (self.a + byte as u32) % MODULUS;
        self.b = (self.b + self.a) % MODULUS;

        if self.window.len() > WINDOW {
            let out = self.window.pop_front().unwrap();
            self.a = (self.a + MODULUS - (out as u32 % MODULUS)) % MODULUS;
            self.b = (self.b + MODULUS - ((WINDOW as u32 * out as u32) % MODULUS)) % MODULUS;
        }

        if self.window.len() == WINDOW {
            Some((self.b << 16) | self.a)
        } else {
            None
        }
    }
}

fn window_checksums(data: &[u8]) -> std::collections::HashSet<u32> {
    let mut set = std::collections::HashSet::new();
    if data.len() < WINDOW {
        if !data.is_empty() {
            set.insert(Hash32::of(data));
        }
        return set;
    }
    let mut roll = RollingChecksum::new();
    for &byte in data {
        if let Some(sum) = roll.push(byte) {
            set.insert(sum);
        }
    }
    set
}

/// cheap whole-buffer fallback checksum for inputs shorter than one window.
struct Hash32;
impl Hash32 {
    fn of(data: &[u8]) -> u32 {
        data.iter()
            .fold(0u32, |acc, &b| acc.wrapping_mul(131).wrapping_add(b as u32))
    }
}

/// fraction (0.0..=1.0) of `target`'s windows that also appear somewhere in
/// `source`, used as a cheap proxy for "would bsdiff shrink this a lot".
pub fn estimate_coverage(source: &[u8], target: &[u8]) -> f64 {
    if target.is_empty() {
        return 1.0;
    }
    let source_windows = window_checksums(source);
    if source_windows.is_empty() {
        return 0.0;
    }

    let mut total = 0usize;
    let mut matched = 0usize;
    let mut roll = RollingChecksum::new();
    if target.len() < WINDOW {
        total = 1;
        if source_windows.contains(&Hash32::of(target)) {
            matched = 1;
        }
    } else {
        for &byte in target {
            if let Some(sum) = roll.push(byte) {
                total += 1;
                if source_windows.contains(&sum) {
                    matched += 1;
                }
            }
        }
    }

    if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64
    }
}
