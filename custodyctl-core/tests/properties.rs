use std::collections::BTreeSet;

use custodyctl_core::{
    attach, distinct_keys, format_driver_error, index_by, validate_password, AmountRange,
    Currency, DriverError, ManagerIds, PriceColumnsPlan, PriceField, Profile, Role, RoleName,
    SeedPlan, Wallet,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use uuid::Uuid;

fn role_name() -> impl Strategy<Value = RoleName> {
    prop::sample::select(RoleName::ALL.to_vec())
}

proptest! {
    #[test]
    fn enrichment_keeps_every_row(
        parents in prop::collection::vec(prop::option::of(0u8..20), 0..50),
        known in prop::collection::btree_set(0u8..20, 0..10),
    ) {
        let rows: Vec<(usize, Option<u8>)> = parents.into_iter().enumerate().collect();
        let keys = distinct_keys(&rows, |r| r.1);
        let related = index_by(
            known.iter().copied().filter(|k| keys.contains(k)),
            |k| *k,
        );

        let out = attach(rows.clone(), &related, |r| r.1);
        prop_assert_eq!(out.len(), rows.len());
        for (enriched, original) in out.iter().zip(&rows) {
            prop_assert_eq!(&enriched.row, original);
            let expected = original.1.filter(|k| known.contains(k));
            prop_assert_eq!(enriched.related, expected);
        }
    }

    #[test]
    fn password_validation_is_total(password in ".{0,64}") {
        let check = validate_password(&password);
        prop_assert!(check.score <= 6);
        prop_assert_eq!(check.valid, check.issues.is_empty());
    }

    #[test]
    fn password_with_required_classes_is_valid(
        body in "[a-z]{1,10}",
        upper in "[A-Z]{1,4}",
        digits in "[0-9]{1,4}",
        special in "[!@#$%^&*-]{0,4}",
    ) {
        let password = format!("{upper}{body}{digits}{special}xxxxxxxx");
        prop_assert!(validate_password(&password).valid);
    }

    #[test]
    fn unique_violation_always_reads_already_exists(context in ".{0,32}", message in ".{0,64}") {
        let err = DriverError::new(Some("23505"), message);
        prop_assert!(format_driver_error(&err, &context).contains("already exists"));
    }

    #[test]
    fn seed_amounts_stay_in_range(seed in any::<u64>(), users in 1usize..6, currencies in 1usize..4) {
        let codes = ["USD", "EUR", "EGP"];
        let currencies: Vec<Currency> = codes[..currencies]
            .iter()
            .map(|c| Currency::parse(c).unwrap())
            .collect();
        let wallets: Vec<Wallet> = currencies
            .iter()
            .map(|c| Wallet {
                id: Uuid::new_v4(),
                name: c.to_string(),
                currency: c.clone(),
                balance: Decimal::ZERO,
            })
            .collect();
        let users: Vec<Uuid> = (0..users).map(|_| Uuid::new_v4()).collect();

        let plan = SeedPlan::build(
            Uuid::new_v4(),
            &users,
            &currencies,
            &wallets,
            AmountRange::default(),
            &mut StdRng::seed_from_u64(seed),
        )
        .unwrap();

        prop_assert_eq!(plan.len(), users.len() * currencies.len());
        for record in &plan.records {
            prop_assert!(record.amount >= Decimal::from(100));
            prop_assert!(record.amount < Decimal::from(10_000));
        }
    }

    #[test]
    fn manager_ids_exclude_other_roles(assigned in prop::collection::vec(prop::option::of(role_name()), 0..30)) {
        let roles: Vec<Role> = RoleName::ALL
            .into_iter()
            .map(|name| Role { id: Uuid::new_v4(), name, description: String::new() })
            .collect();
        let profiles: Vec<Profile> = assigned
            .iter()
            .map(|name| Profile {
                id: Uuid::new_v4(),
                full_name: String::new(),
                email: String::new(),
                role_id: name.and_then(|n| roles.iter().find(|r| r.name == n)).map(|r| r.id),
            })
            .collect();

        let managers = ManagerIds::resolve(&profiles, &roles);
        for (profile, role) in profiles.iter().zip(&assigned) {
            prop_assert_eq!(managers.contains(profile.id), *role == Some(RoleName::Manager));
        }
    }

    #[test]
    fn price_plan_converges_in_one_run(mask in 0u8..=255) {
        let mut columns: BTreeSet<String> = BTreeSet::from(["id".to_string()]);
        for (i, field) in PriceField::ALL.iter().enumerate() {
            if mask & (1 << (2 * i)) != 0 {
                columns.insert(field.legacy().to_string());
            }
            if mask & (1 << (2 * i + 1)) != 0 {
                columns.insert(field.column().to_string());
            }
        }

        PriceColumnsPlan::from_columns(&columns).apply_to(&mut columns);
        prop_assert!(PriceColumnsPlan::from_columns(&columns).is_empty());
    }
}
