use std::fmt;

use modsurfer_hw::sim::RegisterFile;

pub struct AuditLine {
    pub name: &'static str,
    pub before: u32,
    pub after: u32,
    width: usize,
}

impl AuditLine {
    pub fn matches(&self) -> bool {
        self.before == self.after
    }
}

impl fmt::Display for AuditLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.width;
        write!(
            f,
            "{:<10} ${:0w$X}  ${:0w$X}  {}",
            self.name,
            self.before,
            self.after,
            if self.matches() { "ok" } else { "CHANGED" },
            w = w
        )
    }
}

/// Compare what the host had against what it got back.
pub fn compare(before: &RegisterFile, after: &RegisterFile) -> Vec<AuditLine> {
    let word = |name, before: u16, after: u16| AuditLine { name, before: before as u32, after: after as u32, width: 4 };
    let long = |name, before: u32, after: u32| AuditLine { name, before, after, width: 8 };

    vec![
        word("COPCON", before.copcon, after.copcon),
        word("DMACON", before.dmacon.bits(), after.dmacon.bits()),
        word("INTENA", before.intena.bits(), after.intena.bits()),
        word("INTREQ", before.intreq.bits(), after.intreq.bits()),
        long("COP1LC", before.cop1lc, after.cop1lc),
        long("LEVEL2", before.level2_vector, after.level2_vector),
        long("LEVEL6", before.level6_vector, after.level6_vector),
    ]
}
