//! Display-name processing at emit time.

/// De-duplicate a remark against the names already emitted into the current
/// artifact, suffixing `" 2"`, `" 3"`, … on collision.
///
/// `proc_comma` quotes remarks containing commas for INI-flavoured targets.
pub fn process_remark(remark: &mut String, remarks_list: &[String], proc_comma: bool) {
    if proc_comma && remark.contains(',') {
        *remark = format!("\"{}\"", remark);
    }

    let base = remark.clone();
    let mut count = 2;
    while remarks_list.contains(remark) {
        *remark = format!("{} {}", base, count);
        count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_remark_no_collision() {
        let mut remark = "Node".to_string();
        process_remark(&mut remark, &[], false);
        assert_eq!(remark, "Node");
    }

    #[test]
    fn test_process_remark_suffixes() {
        let list = vec!["Node".to_string(), "Node 2".to_string()];
        let mut remark = "Node".to_string();
        process_remark(&mut remark, &list, false);
        assert_eq!(remark, "Node 3");
    }

    #[test]
    fn test_process_remark_quotes_commas() {
        let mut remark = "Tokyo, JP".to_string();
        process_remark(&mut remark, &[], true);
        assert_eq!(remark, "\"Tokyo, JP\"");
    }
}
