//! End-to-end passes over in-process backends: scheduler -> orchestrator ->
//! rules -> alarm store, with readings written the way the fusion process
//! writes them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use carewatch_cache::{KeyLayout, KvStore, MemoryKv};
use carewatch_core::config::{EngineConfig, RuleThresholds};
use carewatch_core::{
    AlarmCategory, AlarmStatus, BedStatus, DeviceType, EntityKind, MonitoredEntity, Posture,
    PostureKind, Reading, SensorSource, VitalSign,
};
use carewatch_rules::{Orchestrator, PassReport, RuleSet, Scheduler, TenantContext};
use carewatch_storage::{MemoryAlarmStore, StaticCatalog};

const TENANT: &str = "t-1";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

struct Engine {
    scheduler: Scheduler,
    kv: Arc<MemoryKv>,
    alarms: Arc<MemoryAlarmStore>,
    token: CancellationToken,
}

impl Engine {
    fn new(entities: Vec<MonitoredEntity>) -> Self {
        let kv = Arc::new(MemoryKv::new());
        let alarms = Arc::new(MemoryAlarmStore::new());
        let ctx = TenantContext::new(
            TENANT,
            kv.clone(),
            KeyLayout::default(),
            alarms.clone(),
            Arc::new(StaticCatalog::new(entities)),
            EngineConfig::default(),
        );
        let rules = RuleSet::standard(&RuleThresholds::default());
        Self {
            scheduler: Scheduler::new(ctx, Orchestrator::new(rules)),
            kv,
            alarms,
            token: CancellationToken::new(),
        }
    }

    async fn write(&self, entity_id: &str, reading: &Reading) {
        self.scheduler
            .context()
            .gateway
            .put_reading(entity_id, reading, None)
            .await
            .unwrap();
    }

    async fn poll(&mut self, secs: i64) -> PassReport {
        self.scheduler.run_pass_at(at(secs), &self.token).await.unwrap()
    }

    async fn state_exists(&self, key: &str) -> bool {
        self.kv.exists(key).await.unwrap()
    }
}

fn bed() -> MonitoredEntity {
    MonitoredEntity::new("card-1", TENANT, EntityKind::Bed)
}

fn off_bed(secs: i64) -> Reading {
    let mut r = Reading::empty(at(secs));
    r.bed_status = Some(BedStatus::OffBed);
    r
}

fn bathroom(id: &str) -> MonitoredEntity {
    MonitoredEntity::new(id, TENANT, EntityKind::Area)
        .with_name("Room 12")
        .with_binding(format!("radar-{id}"), DeviceType::PresenceRadar, Some("Room 12 Bathroom"))
}

fn standing(secs: i64, people: u32) -> Reading {
    let mut r = Reading::empty(at(secs));
    r.person_count = people;
    r.postures = (1..=people)
        .map(|n| Posture::new(n.to_string(), PostureKind::Standing).at(1.0 + n as f64, 1.0, 1.6))
        .collect();
    r
}

const BED_EXIT_STATE: &str = "alarm:state:card-1:track_0:bed_exit_fall";

#[tokio::test]
async fn scenario_a_empty_bed_without_vitals_raises_one_fall_alarm() {
    let mut engine = Engine::new(vec![bed()]);

    for secs in [0, 30, 61] {
        engine.write("card-1", &off_bed(secs)).await;
        engine.poll(secs).await;
    }

    let alarms = engine.alarms.all();
    assert_eq!(alarms.len(), 1);
    let alarm = &alarms[0];
    assert_eq!(alarm.event_type, "fall_from_bed");
    assert_eq!(alarm.category, AlarmCategory::Safety);
    assert_eq!(alarm.status, AlarmStatus::Active);
    assert_eq!(alarm.tenant_id, TENANT);
    assert_eq!(alarm.triggered_at, at(61));

    let snapshot = alarm.trigger_snapshot().unwrap();
    assert_eq!(snapshot.source, SensorSource::BedSensor);
    assert_eq!(snapshot.heart_rate, None);
    assert_eq!(snapshot.duration_secs, Some(61));
    assert_eq!(snapshot.clinical_code.unwrap().display, "Fall");

    let mirror = engine
        .scheduler
        .context()
        .gateway
        .get_active_alarms("card-1")
        .await
        .unwrap();
    assert_eq!(mirror.len(), 1);
    assert_eq!(mirror[0].id, alarm.id);
    assert!(!engine.state_exists(BED_EXIT_STATE).await);
}

#[tokio::test]
async fn scenario_b_vitals_returning_cancels_the_episode() {
    let mut engine = Engine::new(vec![bed()]);

    engine.write("card-1", &off_bed(0)).await;
    engine.poll(0).await;
    assert!(engine.state_exists(BED_EXIT_STATE).await);

    let mut r = off_bed(30);
    r.heart = VitalSign::new(72, SensorSource::BedSensor, at(30));
    engine.write("card-1", &r).await;
    engine.poll(30).await;

    engine.write("card-1", &off_bed(61)).await;
    engine.poll(61).await;
    assert!(!engine.state_exists(BED_EXIT_STATE).await);

    for secs in [90, 125, 200] {
        engine.write("card-1", &off_bed(secs)).await;
        engine.poll(secs).await;
    }
    assert_eq!(engine.alarms.count(), 0);
    assert!(!engine.state_exists(BED_EXIT_STATE).await);
}

#[tokio::test]
async fn scenario_c_lone_stander_in_bathroom_alarms_but_pairs_do_not() {
    let mut engine = Engine::new(vec![bathroom("a-12"), bathroom("a-13")]);

    for secs in [0, 150, 301] {
        engine.write("a-12", &standing(secs, 1)).await;
        engine.write("a-13", &standing(secs, 2)).await;
        engine.poll(secs).await;
    }

    let alarms = engine.alarms.all();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].entity_id, "a-12");
    assert_eq!(alarms[0].event_type, "bathroom_prolonged_standing");
    assert_eq!(
        alarms[0].trigger_snapshot().unwrap().posture.as_deref(),
        Some("standing")
    );
}

#[tokio::test]
async fn continuous_condition_is_persisted_once_per_window() {
    let mut engine = Engine::new(vec![bed()]);

    let mut suppressed = 0;
    for secs in (0..=300).step_by(5) {
        engine.write("card-1", &off_bed(secs)).await;
        suppressed += engine.poll(secs).await.duplicates_suppressed;
    }

    assert_eq!(engine.alarms.count(), 1);
    assert!(suppressed >= 1, "re-fired episodes should be suppressed");
}

#[tokio::test(start_paused = true)]
async fn expired_state_restarts_from_scratch() {
    let mut engine = Engine::new(vec![bed()]);

    engine.write("card-1", &off_bed(0)).await;
    engine.poll(0).await;
    assert!(engine.state_exists(BED_EXIT_STATE).await);

    // Bed-exit state lives 2 x 60s + 60s without a refresh.
    tokio::time::advance(Duration::from_secs(181)).await;
    assert!(!engine.state_exists(BED_EXIT_STATE).await);

    engine.write("card-1", &off_bed(200)).await;
    engine.poll(200).await;
    assert_eq!(engine.alarms.count(), 0, "stale left-bed time must not carry over");

    engine.write("card-1", &off_bed(261)).await;
    engine.poll(261).await;
    assert_eq!(engine.alarms.count(), 1);
}

#[tokio::test]
async fn entity_without_reading_is_skipped_untouched() {
    let mut engine = Engine::new(vec![bed()]);

    let report = engine.poll(0).await;
    assert_eq!(report.skipped, 1);
    assert_eq!(report.evaluated, 0);
    assert!(engine.kv.is_empty());
    assert_eq!(engine.alarms.count(), 0);
}

#[tokio::test]
async fn sleeping_patient_on_radarless_bed_raises_nothing() {
    let bed = bed().with_binding("vs-1", DeviceType::VitalSignSensor, None);
    let mut engine = Engine::new(vec![bed]);

    for secs in (0..=3600).step_by(5) {
        let mut r = Reading::empty(at(secs));
        r.bed_status = Some(BedStatus::OnBed);
        r.heart = VitalSign::new(66, SensorSource::BedSensor, at(secs));
        engine.write("card-1", &r).await;
        engine.poll(secs).await;
    }

    assert_eq!(engine.alarms.count(), 0);
}

#[tokio::test]
async fn uncorroborated_vitals_are_flagged_but_not_persisted() {
    let bed = bed()
        .with_binding("vs-1", DeviceType::VitalSignSensor, None)
        .with_binding("r-1", DeviceType::PresenceRadar, None);
    let mut engine = Engine::new(vec![bed]);

    let mut withheld = 0;
    for secs in [0, 15, 30] {
        let mut r = Reading::empty(at(secs));
        r.bed_status = Some(BedStatus::OnBed);
        r.heart = VitalSign::new(66, SensorSource::BedSensor, at(secs));
        engine.write("card-1", &r).await;
        withheld += engine.poll(secs).await.withheld;
    }

    assert_eq!(withheld, 1);
    assert_eq!(engine.alarms.count(), 0);
}

fn tracked(secs: i64, kind: PostureKind, z: f64) -> Reading {
    let mut r = Reading::empty(at(secs));
    r.person_count = 1;
    r.postures = vec![Posture::new("5", kind).at(2.0, 2.0, z)];
    r
}

#[tokio::test]
async fn sudden_disappearance_alarms_in_rooms_but_not_beds() {
    let room = MonitoredEntity::new("a-20", TENANT, EntityKind::Area).with_name("Lounge");
    let mut engine = Engine::new(vec![bed(), room]);

    let sequence = [
        tracked(0, PostureKind::Standing, 1.6),
        tracked(3, PostureKind::Lying, 0.5),
        Reading::empty(at(6)),
    ];
    for (secs, reading) in [0, 3, 6].into_iter().zip(sequence) {
        engine.write("card-1", &reading).await;
        engine.write("a-20", &reading).await;
        engine.poll(secs).await;
    }

    let alarms = engine.alarms.all();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].entity_id, "a-20");
    assert_eq!(alarms[0].event_type, "sudden_disappearance");
    assert_eq!(alarms[0].category, AlarmCategory::Safety);
}
