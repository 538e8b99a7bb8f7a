use std::borrow::Cow;
use std::io;
use std::sync::{Arc, Mutex, Once};

use chrono::{NaiveDate, NaiveDateTime};
use taf_rt_core::{ChangeType, ObservationOrigin, Parameter, RejectionReason, VerificationCfg};
use taf_rt_supervisor::*;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn ts(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(h, m, 0))
        .unwrap()
}

fn fc_rec(
    station: &'static str,
    change_type: &'static str,
    issued: NaiveDateTime,
    start: NaiveDateTime,
    end: NaiveDateTime,
    value: f64,
) -> ForecastRecord<'static> {
    ForecastRecord {
        station: station.into(),
        issue_station: "EGRR".into(),
        issue_time: issued,
        origin: "MANL".into(),
        status: "NORM".into(),
        parameter: "VIS".into(),
        change_type: change_type.into(),
        start,
        end,
        value,
    }
}

fn ob_rec(station: &'static str, origin: &'static str, t: NaiveDateTime, value: f64) -> ObservationRecord<'static> {
    ObservationRecord {
        station: station.into(),
        parameter: "PVI".into(),
        origin: origin.into(),
        issue_time: t,
        value,
    }
}

fn cfg() -> VerificationCfg {
    VerificationCfg {
        verification_period_hours: 4,
        ..VerificationCfg::default()
    }
}

fn batch() -> BatchCfg {
    BatchCfg::new(ts(0, 0), ts(23, 59))
}

fn egll() -> TableKey {
    TableKey {
        station: "EGLL".to_string(),
        parameter: Parameter::Visibility,
    }
}

struct Batch {
    forecasts: Vec<ForecastRecord<'static>>,
    observations: Vec<ObservationRecord<'static>>,
    raw: Vec<RawForecastText<'static>>,
}

/// EGLL verifies cleanly (two issues, the later one unlimited); EGKK has a
/// three-hour observation gap.
fn sample() -> Batch {
    let mut observations: Vec<ObservationRecord<'static>> = (0..7)
        .map(|i| ob_rec("EGLL", "AUTO", ts(6, 30) + chrono::Duration::minutes(30 * i), 6000.0))
        .collect();
    observations.push(ob_rec("EGLL", "SPEC", ts(7, 15), 100.0));
    observations.push(ob_rec("EGKK", "MANL", ts(6, 30), 6000.0));
    observations.push(ob_rec("EGKK", "MANL", ts(9, 30), 6000.0));

    Batch {
        forecasts: vec![
            fc_rec("EGLL", "INIT", ts(5, 0), ts(6, 0), ts(10, 0), 6000.0),
            fc_rec("EGLL", "INIT", ts(5, 30), ts(6, 0), ts(10, 0), 9999.0),
            fc_rec("EGKK", "INIT", ts(5, 0), ts(6, 0), ts(10, 0), 6000.0),
        ],
        observations,
        raw: vec![RawForecastText {
            station: "EGLL".into(),
            start: ts(6, 0),
            text: Cow::Borrowed("TAF AMD EGLL 010530Z 0106/0110 9999"),
        }],
    }
}

fn run(sup: &VerificationSupervisor, b: &Batch) -> BatchReport {
    let builder = BasicComponentBuilder::new(sup.cfg().clone());
    sup.ingest(&builder, &batch(), &b.forecasts, &b.observations, &b.raw)
}

#[test]
fn gap_rejection_does_not_stop_batch() {
    init_tracing();
    let sup = VerificationSupervisor::new(4, cfg());
    let report = run(&sup, &sample());

    assert_eq!(report.plain.accepted, 1);
    assert_eq!(report.plain.rejected.len(), 1);
    assert!(matches!(
        report.plain.rejected[0].1,
        RejectionReason::ObservationGap { .. }
    ));
    assert_eq!(report.uncertainty.accepted, 1);
    assert_eq!(report.uncertainty.rejections_by_kind().get("observation_gap"), Some(&1));
    assert!(report.summary().starts_with("1 TAFs processed, 1 TAFs ignored"));

    // The later, unlimited issue was verified; the SPECI was left out.
    let tables = sup.tables(&egll()).unwrap();
    let plain = tables.plain.unwrap();
    assert_eq!(plain.get(5, 4, 5), 7);
    assert_eq!(plain.total(), 7 * 6);
    assert_eq!(tables.uncertainty.unwrap().get(5, 4, 20), 7);
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn rejections_are_logged_as_warnings() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let sup = VerificationSupervisor::new(1, cfg());
    tracing::subscriber::with_default(subscriber, || run(&sup, &sample()));

    let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    let rejected: Vec<&str> = out.lines().filter(|l| l.contains("rejected")).collect();
    assert_eq!(rejected.len(), 2, "{out}");
    assert!(rejected.iter().all(|l| l.contains("WARN")), "{out}");
    assert!(out.lines().any(|l| l.contains("INFO") && l.contains("accepted")));
}

#[test]
fn builder_with_other_thresholds_is_rejected_per_forecast() {
    init_tracing();
    let sup = VerificationSupervisor::new(2, cfg());
    let finer = VerificationCfg {
        visibility_thresholds: vec![350.0, 800.0, 1500.0, 3000.0, 5000.0, 10000.0],
        ..cfg()
    };
    let builder = BasicComponentBuilder::new(finer);
    let b = sample();
    let report = sup.ingest(&builder, &batch(), &b.forecasts, &b.observations, &b.raw);

    assert_eq!(report.plain.accepted, 0);
    assert_eq!(report.plain.rejections_by_kind().get("miscategorised"), Some(&2));
    assert_eq!(report.uncertainty.rejections_by_kind().get("miscategorised"), Some(&2));
    assert!(sup.tables(&egll()).is_none());
    assert!(sup.snapshot().tables.is_empty());
}

#[test]
fn snapshot_round_trips_through_json() {
    init_tracing();
    let sup = VerificationSupervisor::new(3, cfg());
    run(&sup, &sample());

    let snap = sup.snapshot();
    assert_eq!(snap.tables.len(), 1);
    let json = serde_json::to_string(&snap).unwrap();
    let back: TableSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snap);

    let fresh = VerificationSupervisor::new(1, cfg());
    let stats = fresh.restore(back.clone());
    assert_eq!(stats.applied, 1);
    assert_eq!(fresh.snapshot(), snap);

    let merged = fresh.restore_merge(back);
    assert_eq!(merged.merged, 1);
    let plain = fresh.tables(&egll()).unwrap().plain.unwrap();
    assert_eq!(plain.get(5, 4, 5), 14);
}

#[test]
fn repeated_batches_accumulate() {
    let sup = VerificationSupervisor::new(2, cfg());
    let b = sample();
    run(&sup, &b);
    run(&sup, &b);
    let plain = sup.tables(&egll()).unwrap().plain.unwrap();
    assert_eq!(plain.get(5, 4, 5), 14);

    sup.clear_key(&egll());
    assert!(sup.tables(&egll()).is_none());
}

#[test]
fn assembly_keeps_latest_issue_and_attaches_texts() {
    let b = sample();
    let builder = BasicComponentBuilder::new(cfg());
    let comps = build_forecast_components(&builder, &b.forecasts);
    let obs = build_observation_components(&builder, &b.observations);
    let forecasts = assemble_forecasts(&batch(), comps, obs, &b.raw);

    assert_eq!(forecasts.len(), 2);
    let egll = forecasts.iter().find(|f| f.station() == "EGLL").unwrap();
    assert_eq!(egll.issue_time(), ts(5, 30));
    assert_eq!(egll.observations.len(), 7);
    assert_eq!(egll.raw_text.as_deref(), Some("EGLL 010530Z 0106/0110 9999"));
}

#[test]
fn longest_forecast_wins_where_configured() {
    let builder = BasicComponentBuilder::new(cfg());
    let records = vec![
        fc_rec("EGLC", "INIT", ts(5, 0), ts(6, 0), ts(12, 0), 6000.0),
        fc_rec("EGLC", "INIT", ts(5, 30), ts(6, 0), ts(10, 0), 6000.0),
        fc_rec("EGLL", "INIT", ts(5, 0), ts(6, 0), ts(12, 0), 6000.0),
        fc_rec("EGLL", "INIT", ts(5, 30), ts(6, 0), ts(10, 0), 6000.0),
    ];
    let comps = build_forecast_components(&builder, &records);
    let forecasts = assemble_forecasts(&batch(), comps, Vec::new(), &[]);

    let eglc = forecasts.iter().find(|f| f.station() == "EGLC").unwrap();
    assert_eq!(eglc.length_hours(), 6.0);
    let egll = forecasts.iter().find(|f| f.station() == "EGLL").unwrap();
    assert_eq!(egll.length_hours(), 4.0);
}

#[test]
fn change_groups_join_their_forecast() {
    let builder = BasicComponentBuilder::new(cfg());
    let records = vec![
        fc_rec("EGLL", "INIT", ts(5, 0), ts(6, 0), ts(10, 0), 6000.0),
        fc_rec("EGLL", "PROB30 TEMPO", ts(5, 0), ts(7, 0), ts(9, 0), 2000.0),
        // Issued with a forecast outside the window: dropped.
        fc_rec("EGLL", "BECMG", ts(4, 0), ts(7, 0), ts(9, 0), 2000.0),
    ];
    let comps = build_forecast_components(&builder, &records);
    let forecasts = assemble_forecasts(&batch(), comps, Vec::new(), &[]);

    assert_eq!(forecasts.len(), 1);
    assert_eq!(forecasts[0].components.len(), 1);
    let group = &forecasts[0].components[0];
    assert_eq!(group.change_type, ChangeType::Prob30Tempo);
    assert_eq!(group.prob, 0.3);
    assert_eq!((group.min_matches, group.max_matches), (1.0, 2.0));
}

#[test]
fn adapter_converts_units_and_sentinels() {
    let builder = BasicComponentBuilder::default();
    let mut rec = ob_rec("EGLL", "MANL", ts(6, 0), 300.0);
    rec.parameter = "CLB".into();
    let ob = builder.observation_component(&rec).unwrap();
    assert_eq!(ob.parameter, Parameter::CloudBase);
    assert_eq!(ob.value, 980.0);
    assert_eq!(ob.category, 2);
    assert_eq!(ob.origin, ObservationOrigin::Manual);

    rec.value = 3047.0;
    let unlimited = builder.observation_component(&rec).unwrap();
    assert!(unlimited.value.is_infinite());
    assert_eq!(unlimited.category, 4);

    let vis = builder
        .observation_component(&ob_rec("EGLL", "AUTO", ts(6, 0), 9999.0))
        .unwrap();
    assert_eq!(vis.category, 5);
}

#[test]
fn adapter_rejects_unknown_rows() {
    let builder = BasicComponentBuilder::default();
    let mut rec = ob_rec("EGLL", "MANL", ts(6, 0), 300.0);
    rec.parameter = "WND".into();
    assert_eq!(
        builder.observation_component(&rec).unwrap_err(),
        AdapterError::UnknownParameter("WND".to_string())
    );
    assert!(matches!(
        builder.observation_component(&ob_rec("EGLL", "XXXX", ts(6, 0), 300.0)),
        Err(AdapterError::UnknownOrigin(_))
    ));
    assert!(matches!(
        builder.observation_component(&ob_rec("EGLL", "AUTO", ts(6, 0), -5.0)),
        Err(AdapterError::Uncategorised { .. })
    ));

    let bad = fc_rec("EGLL", "PROB50", ts(5, 0), ts(6, 0), ts(10, 0), 6000.0);
    assert!(matches!(
        builder.forecast_component(&bad),
        Err(AdapterError::UnknownChangeType(_))
    ));
    assert!(build_forecast_components(&builder, &[bad]).is_empty());
}

#[test]
fn batch_cfg_defaults_from_json() {
    let cfg: BatchCfg = serde_json::from_str(
        r#"{"window_start": "2024-03-01T00:00:00", "window_end": "2024-03-02T00:00:00"}"#,
    )
    .unwrap();
    assert!(cfg.use_auto_metars);
    assert!(!cfg.use_specis);
    assert_eq!(cfg.longest_wins_stations, vec!["EGLC".to_string()]);
    assert!(cfg.accepts_origin(ObservationOrigin::Manual));
    assert!(!cfg.accepts_origin(ObservationOrigin::Special));
}
