//! Whole events written and read back.

use crate::model::*;
use proptest::prelude::*;
use sio::{Arena, Stream, StreamConfig};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn events_roundtrip_with_links_intact() {
    init_tracing();
    let bytes = write_events((0..5).map(|i| build_event(i, 6)).collect());

    let mut input = reader(bytes);
    connect_empty(input.record(EVENT)).unwrap();

    let mut count = 0;
    while let Some(rec) = input.read_record().unwrap() {
        let expected = build_event(count, 6);
        assert_eq!(rec.block::<EventHeader>(HEADER), Some(&expected.header));
        assert_eq!(rec.block_version(HEADER), Some(0x0002_0001));

        let particles = rec.block::<Arena<McParticle>>(PARTICLES).unwrap();
        let hits = rec.block::<Arena<CaloHit>>(HITS).unwrap();
        let clusters = rec.block::<ClusterCollection>(CLUSTERS).unwrap();
        assert_eq!(particles.len(), 6);
        assert_eq!(hits.len(), 6);
        assert_eq!(clusters.clusters.len(), 3);

        // every daughter lists its parent, and the parent lists it back
        for (h, p) in particles.iter() {
            for d in &p.daughters {
                let daughter = particles.resolve(d).unwrap();
                assert_eq!(daughter.parents.len(), 1);
                assert_eq!(daughter.parents[0].get(), Some(h));
            }
        }

        for (i, cluster) in clusters.clusters.iter().enumerate() {
            let mc = particles.resolve(&cluster.mc).unwrap();
            assert_eq!(mc.pdg, 11 + i as i32);
            let sum: f32 = cluster
                .hits
                .iter()
                .map(|p| hits.resolve(p).unwrap().energy)
                .sum();
            assert_eq!(sum, cluster.energy);
        }

        let total: f32 = clusters.clusters.iter().map(|c| c.energy).sum();
        assert_eq!(clusters.total_energy, total);
        assert_eq!(clusters.linked_version, Some(0x0001_0003));
        count += 1;
    }
    assert_eq!(count, 5);
}

#[test]
fn compressed_events_on_disk() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.sio");

    let mut out = Stream::create(&path)
        .unwrap()
        .with_config(StreamConfig::for_testing())
        .unwrap();
    for i in 0..3 {
        out.del_record(EVENT);
        connect_event(out.record(EVENT), build_event(i, 40)).unwrap();
        out.write_record(EVENT).unwrap();
    }
    out.flush().unwrap();
    drop(out);

    let mut input = Stream::open(&path).unwrap();
    connect_empty(input.record(EVENT)).unwrap();
    let mut events = 0;
    while let Some(rec) = input.read_record().unwrap() {
        assert!(rec.compress());
        let hits = rec.block::<Arena<CaloHit>>(HITS).unwrap();
        assert_eq!(hits.len(), 40);
        events += 1;
    }
    assert_eq!(events, 3);
}

proptest! {
    #[test]
    fn event_sizes_roundtrip(n in 1usize..24, events in 1i32..4) {
        let bytes = write_events((0..events).map(|i| build_event(i, n)).collect());
        prop_assert_eq!(bytes.len() % 4, 0);

        let mut input = reader(bytes);
        connect_empty(input.record(EVENT)).unwrap();
        let mut seen = 0;
        while let Some(rec) = input.read_record().unwrap() {
            let clusters = rec.block::<ClusterCollection>(CLUSTERS).unwrap();
            prop_assert_eq!(clusters.clusters.len(), (n + 1) / 2);
            let hits = rec.block::<Arena<CaloHit>>(HITS).unwrap();
            for c in &clusters.clusters {
                for p in &c.hits {
                    prop_assert!(hits.resolve(p).is_some());
                }
            }
            seen += 1;
        }
        prop_assert_eq!(seen, events);
    }
}
