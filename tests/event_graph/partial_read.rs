//! Reading a subset of an event's blocks.

use crate::model::*;
use sio::{Arena, Record};

#[test]
fn dropping_particles_nils_cluster_links() {
    let bytes = write_events(vec![build_event(0, 4)]);

    let mut input = reader(bytes);
    let rec: &mut Record = input.record(EVENT);
    rec.connect(CLUSTERS, ClusterCollection::default()).unwrap();
    rec.connect(HITS, Arena::<CaloHit>::new()).unwrap();

    let rec = input.read_record().unwrap().unwrap();
    let clusters = rec.block::<ClusterCollection>(CLUSTERS).unwrap();
    let hits = rec.block::<Arena<CaloHit>>(HITS).unwrap();

    assert_eq!(clusters.clusters.len(), 2);
    for c in &clusters.clusters {
        assert!(c.mc.is_null());
        assert!(c.hits.iter().all(|p| hits.resolve(p).is_some()));
    }
    assert!(rec.block::<EventHeader>(HEADER).is_none());
}

#[test]
fn header_only_reader() {
    let bytes = write_events((0..3).map(|i| build_event(i, 5)).collect());

    let mut input = reader(bytes);
    input
        .record(EVENT)
        .connect(HEADER, EventHeader::default())
        .unwrap();

    let mut events = Vec::new();
    while let Some(rec) = input.read_record().unwrap() {
        events.push(rec.block::<EventHeader>(HEADER).unwrap().event);
    }
    assert_eq!(events, vec![0, 1, 2]);
}

#[test]
fn events_skipped_when_not_unpacked() {
    let bytes = write_events((0..3).map(|i| build_event(i, 2)).collect());

    let mut input = reader(bytes);
    connect_empty(input.record(EVENT)).unwrap();
    input.record(EVENT).set_unpack(false);

    assert!(input.read_record().unwrap().is_none());
    assert!(input.position() > 0);
}
