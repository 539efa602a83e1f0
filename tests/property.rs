use proptest::prelude::*;
use stepsign::tx::Intent;
use stepsign::{ErrorCode, MultisigPolicy, PartialSignature, SuiKeyPair, TransactionDigest};

fn keypair(i: usize) -> SuiKeyPair {
    SuiKeyPair::from_seed(&[i as u8 + 1; 32])
}

fn policy(weights: &[u8], threshold: u16) -> MultisigPolicy {
    let pairs = weights.iter().enumerate().map(|(i, w)| (keypair(i).public(), *w)).collect();
    MultisigPolicy::from_pairs(pairs, threshold).expect("valid policy")
}

fn partial(i: usize, digest: &TransactionDigest) -> PartialSignature {
    let pair = keypair(i);
    PartialSignature::new(pair.public(), pair.sign_with_flag(digest.as_bytes()))
}

fn weights_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(1u8..=3, 2..=6)
}

proptest! {
    #[test]
    fn digest_is_deterministic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let a = TransactionDigest::of_intent_message(Intent::transaction_data(), &bytes);
        let b = TransactionDigest::of_intent_message(Intent::transaction_data(), &bytes);
        prop_assert_eq!(a, b);

        let other = TransactionDigest::of_intent_message(Intent::personal_message(), &bytes);
        prop_assert_ne!(a, other);
    }

    #[test]
    fn combine_ignores_input_order(
        (weights, order) in weights_strategy().prop_flat_map(|w| {
            let indices: Vec<usize> = (0..w.len()).collect();
            (Just(w), Just(indices).prop_shuffle())
        }),
        seed in any::<[u8; 32]>(),
    ) {
        let total: u16 = weights.iter().map(|w| u16::from(*w)).sum();
        let policy = policy(&weights, total);
        let digest = TransactionDigest::from_bytes(&seed).unwrap();

        let sorted: Vec<_> = (0..weights.len()).map(|i| partial(i, &digest)).collect();
        let shuffled: Vec<_> = order.iter().map(|i| partial(*i, &digest)).collect();

        let a = policy.combine(&sorted).unwrap();
        let b = policy.combine(&shuffled).unwrap();
        prop_assert_eq!(a.as_serialized(), b.as_serialized());
        prop_assert_eq!(a.bitmap(), b.bitmap());
        prop_assert_eq!(a.weight(), total);
    }

    #[test]
    fn combine_succeeds_exactly_at_threshold(
        (weights, mask) in weights_strategy().prop_flat_map(|w| {
            let n = w.len();
            (Just(w), prop::collection::vec(any::<bool>(), n))
        }),
        threshold_seed in any::<u16>(),
    ) {
        let total: u16 = weights.iter().map(|w| u16::from(*w)).sum();
        let threshold = threshold_seed % total + 1;
        let policy = policy(&weights, threshold);
        let digest = TransactionDigest::from_bytes(&[7u8; 32]).unwrap();

        let chosen: Vec<usize> = mask.iter().enumerate().filter(|(_, m)| **m).map(|(i, _)| i).collect();
        let collected: u16 = chosen.iter().map(|i| u16::from(weights[*i])).sum();
        let partials: Vec<_> = chosen.iter().map(|i| partial(*i, &digest)).collect();

        match policy.combine(&partials) {
            Ok(combined) => {
                prop_assert!(collected >= threshold);
                prop_assert_eq!(combined.weight(), collected);
            }
            Err(e) => {
                prop_assert!(collected < threshold);
                prop_assert_eq!(e.code, ErrorCode::ThresholdNotMet);
            }
        }
    }
}
