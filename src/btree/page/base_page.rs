use super::BTreePageID;

/// Fields every page carries.
pub struct BTreeBasePage {
    pid: BTreePageID,

    // bumped whenever a row changes its slot on this page, a saved scan
    // position is still valid iff the version it saw is the current one
    version: u64,
}

impl BTreeBasePage {
    pub fn new(pid: &BTreePageID) -> BTreeBasePage {
        BTreeBasePage {
            pid: *pid,
            version: 0,
        }
    }

    pub fn get_pid(&self) -> BTreePageID {
        self.pid
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }
}
