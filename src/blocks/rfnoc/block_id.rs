/// Compose a block id like `0/DDC_1`.
///
/// Negative selectors are omitted, i.e., `make_block_id("DDC", -1, -1)` is
/// just `DDC`, which matches every DDC on every device.
pub fn make_block_id(block_name: &str, block_select: i32, device_select: i32) -> String {
    let mut id = String::new();
    if device_select >= 0 {
        id.push_str(&format!("{device_select}/"));
    }
    id.push_str(block_name);
    if block_select >= 0 {
        id.push_str(&format!("_{block_select}"));
    }
    id
}

/// Compose a multi-block id like `0/DDC_0,0/FIR_1`.
///
/// `block_names` is a comma separated list. The selectors are matched by
/// position; missing selectors count as negative.
pub fn make_block_id_multi(
    block_names: &str,
    block_selects: &[i32],
    device_selects: &[i32],
) -> String {
    block_names
        .split(',')
        .filter(|n| !n.is_empty())
        .enumerate()
        .map(|(i, name)| {
            make_block_id(
                name,
                block_selects.get(i).copied().unwrap_or(-1),
                device_selects.get(i).copied().unwrap_or(-1),
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single() {
        assert_eq!(make_block_id("DDC", 1, 0), "0/DDC_1");
        assert_eq!(make_block_id("DDC", -1, 0), "0/DDC");
        assert_eq!(make_block_id("Radio", 0, -1), "Radio_0");
        assert_eq!(make_block_id("FIR", -1, -1), "FIR");
    }

    #[test]
    fn multi() {
        assert_eq!(
            make_block_id_multi("DDC,FIR", &[0, 1], &[0, 0]),
            "0/DDC_0,0/FIR_1"
        );
        assert_eq!(make_block_id_multi("DDC,,FIR", &[2], &[]), "DDC_2,FIR");
        assert_eq!(make_block_id_multi("", &[], &[]), "");
    }
}
