use crate::workflows::postings::targeting::{
    SegmentAxis, SegmentSet, SegmentUniverse, TargetSelection,
};
use std::collections::BTreeSet;

fn universe() -> SegmentUniverse {
    SegmentUniverse::new(
        ["SOE", "SOB", "SOD"],
        ["22-26", "23-27", "24-28"],
        ["BANGALORE", "PUNE"],
    )
}

#[test]
fn toggle_all_cycles_between_all_and_empty() {
    let mut set = SegmentSet::empty();
    set.toggle_all();
    assert!(set.is_all());
    set.toggle_all();
    assert!(set.is_empty());
}

#[test]
fn toggle_all_discards_individual_codes() {
    let mut set = SegmentSet::codes(["SOE", "SOB"]);
    set.toggle_all();
    assert!(set.is_all());
    set.toggle_all();
    // The codes are gone, not restored.
    assert!(set.is_empty());
}

#[test]
fn toggling_a_code_off_all_leaves_only_that_code() {
    let mut set = SegmentSet::All;
    set.toggle_code("SOE", 3);
    assert_eq!(set, SegmentSet::codes(["SOE"]));
}

#[test]
fn toggle_code_inserts_then_removes() {
    let mut set = SegmentSet::empty();
    set.toggle_code("SOE", 3);
    assert!(set.contains("SOE"));
    set.toggle_code("SOE", 3);
    assert!(set.is_empty());
}

#[test]
fn exhaustive_selection_collapses_to_all() {
    let mut set = SegmentSet::codes(["BANGALORE"]);
    set.toggle_code("PUNE", 2);
    assert!(set.is_all());
}

#[test]
fn empty_universe_never_collapses() {
    let mut set = SegmentSet::empty();
    set.toggle_code("UNKNOWN", 0);
    assert_eq!(set, SegmentSet::codes(["UNKNOWN"]));
}

#[test]
fn all_contains_every_code() {
    assert!(SegmentSet::All.contains("anything"));
    assert!(!SegmentSet::empty().contains("anything"));
}

#[test]
fn segment_set_serializes_to_sentinel_or_array() {
    let all = serde_json::to_value(SegmentSet::All).expect("serializes");
    assert_eq!(all, serde_json::json!("ALL"));

    let codes = serde_json::to_value(SegmentSet::codes(["SOB", "SOE"])).expect("serializes");
    assert_eq!(codes, serde_json::json!(["SOB", "SOE"]));
}

#[test]
fn segment_set_deserializes_both_shapes() {
    let all: SegmentSet = serde_json::from_value(serde_json::json!("ALL")).expect("parses");
    assert!(all.is_all());

    let codes: SegmentSet =
        serde_json::from_value(serde_json::json!(["SOE", "SOB", "SOE"])).expect("parses");
    assert_eq!(codes, SegmentSet::Codes(BTreeSet::from(["SOE".to_string(), "SOB".to_string()])));

    // A bare non-sentinel string is read as a one-code set, not an error.
    let single: SegmentSet = serde_json::from_value(serde_json::json!("SOE")).expect("parses");
    assert_eq!(single, SegmentSet::codes(["SOE"]));
}

#[test]
fn selection_flattens_to_target_field_names() {
    let selection = TargetSelection::new(
        SegmentSet::All,
        SegmentSet::codes(["23-27"]),
        SegmentSet::empty(),
    );
    let value = serde_json::to_value(&selection).expect("serializes");
    assert_eq!(
        value,
        serde_json::json!({
            "target_schools": "ALL",
            "target_batches": ["23-27"],
            "target_centers": [],
        })
    );

    let parsed: TargetSelection = serde_json::from_value(value).expect("round-trips");
    assert_eq!(parsed, selection);
}

#[test]
fn selection_is_complete_only_when_every_axis_targets_someone() {
    assert!(TargetSelection::everyone().is_complete());
    assert!(TargetSelection::new(
        SegmentSet::codes(["SOE"]),
        SegmentSet::All,
        SegmentSet::codes(["PUNE"]),
    )
    .is_complete());

    let mut missing_batches = TargetSelection::everyone();
    missing_batches.toggle_all(SegmentAxis::Batch);
    assert!(!missing_batches.is_complete());
}

#[test]
fn selection_toggles_route_to_the_right_axis() {
    let universe = universe();
    let mut selection = TargetSelection::default();

    selection.toggle_all(SegmentAxis::School);
    selection.toggle_code(SegmentAxis::Batch, "23-27", &universe);
    selection.toggle_code(SegmentAxis::Center, "BANGALORE", &universe);
    selection.toggle_code(SegmentAxis::Center, "PUNE", &universe);

    assert!(selection.schools.is_all());
    assert_eq!(selection.batches, SegmentSet::codes(["23-27"]));
    // Both known centers selected, so the axis collapses.
    assert!(selection.centers.is_all());
}

#[test]
fn applies_to_requires_membership_on_every_axis() {
    let selection = TargetSelection::new(
        SegmentSet::All,
        SegmentSet::codes(["23-27"]),
        SegmentSet::codes(["BANGALORE"]),
    );

    assert!(selection.applies_to("SOE", "23-27", "BANGALORE"));
    assert!(!selection.applies_to("SOE", "22-26", "BANGALORE"));
    assert!(!selection.applies_to("SOE", "23-27", "PUNE"));
}

#[test]
fn axis_metadata_is_stable() {
    assert_eq!(
        SegmentAxis::ordered().map(SegmentAxis::label),
        ["School", "Batch", "Center"]
    );
    assert_eq!(universe().axis_len(SegmentAxis::Center), 2);
}
