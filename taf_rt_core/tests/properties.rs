mod common;

use common::*;
use proptest::prelude::*;
use taf_rt_core::uncertainty::{distribution, snapped_distribution};
use taf_rt_core::*;

fn change_type() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::Init),
        Just(ChangeType::Fm),
        Just(ChangeType::Tempo),
        Just(ChangeType::Becmg),
        Just(ChangeType::Prob30),
        Just(ChangeType::Prob40),
        Just(ChangeType::Prob30Tempo),
        Just(ChangeType::Prob40Tempo),
    ]
}

fn visibility() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(100.0),
        Just(500.0),
        Just(1000.0),
        Just(2000.0),
        Just(6000.0),
        Just(f64::INFINITY),
    ]
}

proptest! {
    #[test]
    fn uncertainty_distributions_sum_to_one(
        n in 1u32..30,
        ct in change_type(),
        main in 0usize..6,
        alt in 0usize..6,
    ) {
        let split = uncertainty_split(n as f64, ct, main, alt);
        let raw: f64 = distribution(main, Some(alt), &split).iter().map(|(_, p)| p).sum();
        prop_assert!((raw - 1.0).abs() < 1e-9, "raw sum {}", raw);

        let snapped = snapped_distribution(main, Some(alt), &split);
        let sum: f64 = snapped.iter().map(|(_, p)| p).sum();
        prop_assert!((sum - 1.0).abs() < 1e-6, "snapped sum {} for {:?}", sum, snapped);
    }

    #[test]
    fn matching_respects_quotas(
        ct in change_type().prop_filter("change group", |c| *c != ChangeType::Init),
        comp_value in visibility(),
        init_value in visibility(),
        values in prop::collection::vec(visibility(), 4),
    ) {
        // Group from 1:00 to 3:00; observations every half hour inside it.
        let main = component(ChangeType::Init, 0, 240, init_value);
        let mut comp = component(ct, 60, 180, comp_value);
        let mut obs: Vec<ObservationComponent> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut ob = observation(60 + 30 * i as i64, *v);
                ob.id = ObservationId(i);
                ob
            })
            .collect();

        match_section(&mut obs, vec![&mut comp], &main, MPH * 2.0);

        prop_assert!(comp.matched_count as f64 <= comp.max_matches);
        prop_assert!(comp.exact_matched_count <= comp.matched_count);
        for ob in &obs {
            prop_assert!(ob.allocated_probability <= 1.0 + 1e-9);
            let recorded: f64 = ob.matches.iter().map(|(_, p)| p).sum();
            prop_assert!((recorded - ob.allocated_probability).abs() < 1e-9);
        }
    }

    #[test]
    fn plain_table_counts_every_category_per_observation(
        values in prop::collection::vec(visibility(), 8),
    ) {
        // Init-only: each observation adds exactly one entry per forecast category.
        let obs: Vec<(i64, f64)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (30 * (i as i64 + 1), *v))
            .collect();
        let fc = with_observations(forecast(4, 6000.0), &obs);
        let table = fc.construct_table(&cfg_hours(4)).unwrap();
        prop_assert_eq!(table.total(), 8 * 6);
    }

    #[test]
    fn each_observation_is_worth_one_with_a_change_group(
        ct in change_type().prop_filter("change group", |c| *c != ChangeType::Init),
        init_value in visibility(),
        group_value in visibility(),
        start in 0i64..8,
        len in 1i64..=8,
        values in prop::collection::vec(visibility(), 8),
    ) {
        let end = (start + len).min(8);
        let mut fc = forecast(4, init_value);
        fc.add_component(component(ct, start * 30, end * 30, group_value));
        let obs: Vec<(i64, f64)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (30 * (i as i64 + 1), *v))
            .collect();
        let fc = with_observations(fc, &obs);

        let table = fc.construct_table(&cfg_hours(4)).unwrap();
        prop_assert_eq!(table.total(), 8 * 6);

        // Summing the weighted counts over forecast categories gives back the number
        // of observations in each observed category.
        let contingency = table.to_contingency();
        for observed in 0..6 {
            let expected = values.iter().filter(|v| vis_category(**v) == observed).count() as f64;
            let weight: f64 = contingency.iter().map(|row| row[observed]).sum();
            prop_assert!(
                (weight - expected).abs() < 1e-9,
                "observed category {}: weight {} for {} observations",
                observed,
                weight,
                expected
            );
        }
    }
}
