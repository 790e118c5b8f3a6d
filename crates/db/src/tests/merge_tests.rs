use crate::merge_item;

#[test]
fn absent_existing_takes_item() {
    let item = [0xCCu8; 20];
    assert_eq!(merge_item(None, &item), Some(item.to_vec()));
}

#[test]
fn new_item_is_appended() {
    let a = [0xAAu8; 20];
    let b = [0xBBu8; 20];
    let c = [0xCCu8; 20];
    let existing: Vec<u8> = [a, b].concat();

    let merged = merge_item(Some(&existing), &c).expect("c is new");
    assert_eq!(merged.len(), 60);
    assert_eq!(&merged[..40], existing.as_slice());
    assert_eq!(&merged[40..], &c);
}

#[test]
fn present_item_reports_no_change() {
    let a = [0xAAu8; 20];
    let b = [0xBBu8; 20];
    let c = [0xCCu8; 20];
    let existing: Vec<u8> = [a, b, c].concat();

    assert_eq!(merge_item(Some(&existing), &a), None);
    assert_eq!(merge_item(Some(&existing), &b), None);
    assert_eq!(merge_item(Some(&existing), &c), None);
}

#[test]
fn item_matching_at_a_non_stride_offset_is_still_new() {
    // Bytes 10..30 of existing equal the item, but no 20-byte stride does.
    let mut existing = vec![0u8; 40];
    for (i, byte) in existing.iter_mut().enumerate() {
        *byte = i as u8;
    }
    let item: Vec<u8> = (10u8..30).collect();

    let merged = merge_item(Some(&existing), &item).expect("no stride matches");
    assert_eq!(merged.len(), 60);
}

#[test]
fn empty_existing_value_takes_item() {
    let item = [7u8; 4];
    assert_eq!(merge_item(Some(&[]), &item), Some(item.to_vec()));
}

#[test]
fn narrow_items_merge_by_their_own_width() {
    let existing = vec![1, 2, 3, 4, 5, 6, 7, 8];
    assert_eq!(merge_item(Some(&existing), &[5, 6, 7, 8]), None);
    let merged = merge_item(Some(&existing), &[9, 9, 9, 9]).unwrap();
    assert_eq!(merged, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 9, 9, 9]);
}
