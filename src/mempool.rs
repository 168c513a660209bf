//! Pending transactions waiting to be sealed into a block.
//!
//! On disk the mempool is one ledger line per physical line, each terminated
//! by a newline. An absent mempool is an empty one.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mempool {
    lines: Vec<String>,
}

impl Mempool {
    /// Parses mempool file contents. Blank lines carry nothing and are dropped.
    pub fn parse(contents: &str) -> Self {
        let lines = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Mempool { lines }
    }

    pub fn render(&self) -> String {
        self.lines.iter().map(|line| format!("{line}\n")).collect()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Drops the first `count` lines, returning what was removed.
    pub fn drain_front(&mut self, count: usize) -> Vec<String> {
        let count = count.min(self.lines.len());
        self.lines.drain(..count).collect()
    }

    /// True when `prefix` is exactly the first lines of this mempool.
    pub fn starts_with(&self, prefix: &[String]) -> bool {
        self.lines.starts_with(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let contents = "ZALU transferred 5 to a on t1\n\na transferred 2 to b on t2\n";
        let mempool = Mempool::parse(contents);
        assert_eq!(mempool.len(), 2);
        assert_eq!(
            mempool.render(),
            "ZALU transferred 5 to a on t1\na transferred 2 to b on t2\n"
        );
    }

    #[test]
    fn test_empty() {
        let mempool = Mempool::parse("");
        assert!(mempool.is_empty());
        assert_eq!(mempool.render(), "");
    }

    #[test]
    fn test_drain_front_keeps_later_lines() {
        let mut mempool = Mempool::parse("one\ntwo\nthree\n");
        let snapshot = mempool.lines()[..2].to_vec();
        assert!(mempool.starts_with(&snapshot));
        assert!(!mempool.starts_with(&["two".to_string()]));

        assert_eq!(mempool.drain_front(2), snapshot);
        assert_eq!(mempool.lines(), ["three".to_string()]);
        assert_eq!(mempool.drain_front(10).len(), 1);
        assert!(mempool.is_empty());
    }
}
