//! Shared event model and stream helpers.

#![allow(dead_code)]

use std::io::Cursor;

use sio::{
    sio_fields, Arena, Decoder, Encoder, Handle, Linker, Marshal, Payload, Ptr, Reader, Record,
    Result, Stream, Unmarshal, Version, Writer,
};

pub const EVENT: &str = "Event";
pub const HEADER: &str = "EventHeader";
pub const PARTICLES: &str = "MCParticles";
pub const HITS: &str = "CaloHits";
pub const CLUSTERS: &str = "Clusters";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventHeader {
    pub run: i32,
    pub event: i32,
    pub weight: f64,
    pub detector: String,
}

sio_fields!(EventHeader {
    run,
    event,
    weight,
    detector,
});

impl Payload for EventHeader {
    fn version(&self) -> u32 {
        Version::new(2, 1).raw()
    }
}

#[derive(Debug, Default)]
pub struct McParticle {
    pub pdg: i32,
    pub momentum: [f64; 3],
    pub parents: Vec<Ptr<McParticle>>,
    pub daughters: Vec<Ptr<McParticle>>,
}

sio_fields!(McParticle {
    pdg,
    momentum,
    parents,
    daughters,
});

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CaloHit {
    pub cell_id: u64,
    pub energy: f32,
    pub position: [f32; 3],
}

sio_fields!(CaloHit {
    cell_id,
    energy,
    position,
});

#[derive(Debug, Default)]
pub struct Cluster {
    pub energy: f32,
    pub hits: Vec<Ptr<CaloHit>>,
    pub mc: Ptr<McParticle>,
}

impl Marshal for Cluster {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        let mut enc = Encoder::new(w);
        enc.encode(&self.energy).encode(&self.hits).pointer(&self.mc);
        enc.finish()
    }
}

impl Unmarshal for Cluster {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        let mut dec = Decoder::new(r);
        dec.decode(&mut self.energy)
            .decode(&mut self.hits)
            .pointer(&mut self.mc);
        dec.finish()
    }
}

/// Clusters plus a total computed once the record is linked.
#[derive(Debug, Default)]
pub struct ClusterCollection {
    pub clusters: Vec<Cluster>,
    pub total_energy: f32,
    pub linked_version: Option<u32>,
}

impl Marshal for ClusterCollection {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        self.clusters.marshal(w)
    }
}

impl Unmarshal for ClusterCollection {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        self.total_energy = 0.0;
        self.linked_version = None;
        self.clusters.unmarshal(r)
    }
}

impl Linker for ClusterCollection {
    fn link(&mut self, version: u32) -> Result<()> {
        self.total_energy = self.clusters.iter().map(|c| c.energy).sum();
        self.linked_version = Some(version);
        Ok(())
    }
}

impl Payload for ClusterCollection {
    fn version(&self) -> u32 {
        Version::new(1, 3).raw()
    }

    fn linker(&mut self) -> Option<&mut dyn Linker> {
        Some(self)
    }
}

/// A decay chain `n` particles deep plus `n` hits, each cluster owning two
/// consecutive hits and pointing at one particle.
pub struct Event {
    pub header: EventHeader,
    pub particles: Arena<McParticle>,
    pub hits: Arena<CaloHit>,
    pub clusters: ClusterCollection,
}

pub fn build_event(event: i32, n: usize) -> Event {
    let mut particles = Arena::new();
    let mut chain: Vec<Handle<McParticle>> = Vec::with_capacity(n);
    for i in 0..n {
        let h = particles.push(McParticle {
            pdg: 11 + i as i32,
            momentum: [i as f64, 0.5, -1.0],
            ..McParticle::default()
        });
        if let Some(&parent) = chain.last() {
            particles[h].parents.push(Ptr::to(parent));
            particles[parent].daughters.push(Ptr::to(h));
        }
        chain.push(h);
    }

    let mut hits = Arena::new();
    let hit_handles: Vec<Handle<CaloHit>> = (0..n)
        .map(|i| {
            hits.push(CaloHit {
                cell_id: 1000 + i as u64,
                energy: 0.25 * (i + 1) as f32,
                position: [i as f32, 0.0, 1.0],
            })
        })
        .collect();

    let clusters = hit_handles
        .chunks(2)
        .zip(chain.iter())
        .map(|(pair, &mc)| Cluster {
            energy: pair.iter().map(|&h| hits[h].energy).sum(),
            hits: pair.iter().map(|&h| Ptr::to(h)).collect(),
            mc: Ptr::to(mc),
        })
        .collect();

    Event {
        header: EventHeader {
            run: 1,
            event,
            weight: 1.0 / f64::from(event + 1),
            detector: "ILD_l5".to_string(),
        },
        particles,
        hits,
        clusters: ClusterCollection {
            clusters,
            ..ClusterCollection::default()
        },
    }
}

pub fn connect_event(record: &mut Record, ev: Event) -> Result<()> {
    record.connect(HEADER, ev.header)?;
    record.connect(PARTICLES, ev.particles)?;
    record.connect(CLUSTERS, ev.clusters)?;
    record.connect(HITS, ev.hits)?;
    Ok(())
}

pub fn connect_empty(record: &mut Record) -> Result<()> {
    record.connect(HEADER, EventHeader::default())?;
    record.connect(PARTICLES, Arena::<McParticle>::new())?;
    record.connect(CLUSTERS, ClusterCollection::default())?;
    record.connect(HITS, Arena::<CaloHit>::new())?;
    Ok(())
}

/// Write `events` as consecutive records into memory.
pub fn write_events(events: Vec<Event>) -> Vec<u8> {
    let mut out = Stream::writer("events", Vec::new());
    for ev in events {
        out.del_record(EVENT);
        connect_event(out.record(EVENT), ev).unwrap();
        out.write_record(EVENT).unwrap();
    }
    out.into_inner()
}

pub fn reader(bytes: Vec<u8>) -> Stream<Cursor<Vec<u8>>> {
    Stream::reader("events", Cursor::new(bytes))
}
