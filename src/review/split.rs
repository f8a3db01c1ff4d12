/// Split a comment body into the reviewer's remark and the reviewee's answer.
///
/// The boundary is the first line consisting of exactly `delimiter`. Both
/// halves are trimmed. When no such line exists the whole body belongs to the
/// reviewer. Later delimiter lines are kept verbatim in the reviewee half.
pub fn split(body: &str, delimiter: &str) -> (String, String) {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        let content = line.trim_end_matches('\n').trim_end_matches('\r');
        if content == delimiter {
            let reviewer = &body[..offset];
            let reviewee = &body[offset + line.len()..];
            return (reviewer.trim().to_string(), reviewee.trim().to_string());
        }
        offset += line.len();
    }
    (body.trim().to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIMITER: &str = "---";

    fn pair(reviewer: &str, reviewee: &str) -> (String, String) {
        (reviewer.to_string(), reviewee.to_string())
    }

    #[test]
    fn test_split_lf() {
        assert_eq!(split("foo\n\n---\n\nbar", DELIMITER), pair("foo", "bar"));
        assert_eq!(split("foo\n---", DELIMITER), pair("foo", ""));
        assert_eq!(split("---\nbar", DELIMITER), pair("", "bar"));
        assert_eq!(split("", DELIMITER), pair("", ""));
        assert_eq!(split("---", DELIMITER), pair("", ""));
    }

    #[test]
    fn test_split_crlf() {
        assert_eq!(split("foo\r\n\r\n---\r\n\r\nbar", DELIMITER), pair("foo", "bar"));
        assert_eq!(split("foo\r\n---", DELIMITER), pair("foo", ""));
        assert_eq!(split("---\r\nbar", DELIMITER), pair("", "bar"));
    }

    #[test]
    fn test_split_without_delimiter_keeps_whole_body() {
        assert_eq!(split("  foo\nbar  ", DELIMITER), pair("foo\nbar", ""));
        // the delimiter must occupy its own line
        assert_eq!(split("foo --- bar", DELIMITER), pair("foo --- bar", ""));
        assert_eq!(split("foo\n--- \nbar", DELIMITER), pair("foo\n--- \nbar", ""));
        assert_eq!(split("foo\n----\nbar", DELIMITER), pair("foo\n----\nbar", ""));
    }

    #[test]
    fn test_split_only_first_delimiter() {
        assert_eq!(
            split("foo\r\n\r\n---\r\n\r\nbar\r\n\r\n---\r\n\r\nbaz\r\n", DELIMITER),
            pair("foo", "bar\r\n\r\n---\r\n\r\nbaz")
        );
    }

    #[test]
    fn test_split_custom_delimiter() {
        assert_eq!(split("指摘です\n~~\n対応しました", "~~"), pair("指摘です", "対応しました"));
    }
}
