/// Added and removed line counts of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStat {
    pub additions: usize,
    pub deletions: usize,
}

impl std::ops::AddAssign for DiffStat {
    fn add_assign(&mut self, other: Self) {
        self.additions += other.additions;
        self.deletions += other.deletions;
    }
}

/// Count changed lines in the per-file diff text GitLab returns.
///
/// Such a diff starts with the first hunk header (`@@ -1,5 +1,7 @@`) and has no
/// `---`/`+++` file headers. Every later line starting with `+` is an
/// addition and every one starting with `-` a deletion; context lines, hunk
/// headers and `\ No newline at end of file` markers are not counted.
pub fn count_changes(raw_diff: &str) -> DiffStat {
    let mut stat = DiffStat::default();
    for line in raw_diff.lines().skip(1) {
        if line.starts_with('+') {
            stat.additions += 1;
        } else if line.starts_with('-') {
            stat.deletions += 1;
        }
    }
    stat
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DIFF: &str = r#"@@ -1,5 +1,7 @@
 fn main() {
-    println!("old");
+    println!("new");
+    // Added a comment
 }
@@ -20,2 +22,1 @@
-    let unused = 1;
     run();
\ No newline at end of file
"#;

    #[test]
    fn test_count_changes() {
        let stat = count_changes(SAMPLE_DIFF);
        assert_eq!(stat.additions, 2);
        assert_eq!(stat.deletions, 2);
    }

    #[test]
    fn test_count_new_file() {
        let stat = count_changes("@@ -0,0 +1,2 @@\n+hello\n+world\n");
        assert_eq!(stat, DiffStat { additions: 2, deletions: 0 });
    }

    #[test]
    fn test_count_empty_diff() {
        assert_eq!(count_changes(""), DiffStat::default());
    }

    #[test]
    fn test_add_assign() {
        let mut total = DiffStat { additions: 1, deletions: 2 };
        total += DiffStat { additions: 3, deletions: 4 };
        assert_eq!(total, DiffStat { additions: 4, deletions: 6 });
    }
}
