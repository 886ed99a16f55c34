//! Property tests for comparison, input synthesis and shape validation.

use opc_conformance::{Comparison, InputSynthesizer, ShapeSpec, Tolerance, ValueDomain, compare};
use opc_core::{Shape, Tensor};
use proptest::prelude::*;

// ── Strategies ───────────────────────────────────────────────────────────

fn arb_shape() -> impl Strategy<Value = Shape> {
    prop::collection::vec(1usize..=6, 1..=4).prop_map(Shape::new)
}

fn arb_tensor_pair() -> impl Strategy<Value = (Tensor, Tensor)> {
    arb_shape().prop_flat_map(|shape| {
        let n = shape.numel();
        (
            prop::collection::vec(-100.0f32..100.0, n),
            prop::collection::vec(-100.0f32..100.0, n),
            Just(shape),
        )
            .prop_map(|(a, b, shape)| {
                (
                    Tensor::from_vec(a, shape.clone()).unwrap(),
                    Tensor::from_vec(b, shape).unwrap(),
                )
            })
    })
}

// ── Properties ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn tensor_matches_itself_exactly((a, _) in arb_tensor_pair()) {
        let c = compare(&a, &a, &Tolerance::exact()).unwrap();
        prop_assert_eq!(c, Comparison::Match { max_abs_diff: 0.0 });
    }

    #[test]
    fn max_abs_diff_is_symmetric((a, b) in arb_tensor_pair()) {
        let tol = Tolerance::default();
        let ab = compare(&a, &b, &tol).unwrap().max_abs_diff();
        let ba = compare(&b, &a, &tol).unwrap().max_abs_diff();
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn mismatch_points_at_first_violation((a, b) in arb_tensor_pair()) {
        let tol = Tolerance::default();
        match compare(&a, &b, &tol).unwrap() {
            Comparison::Match { .. } => {
                for (&e, &x) in a.data().iter().zip(b.data()) {
                    prop_assert!(tol.allows(e, x));
                }
            }
            Comparison::Mismatch(m) => {
                prop_assert!(!tol.allows(m.expected, m.actual));
                for i in 0..m.flat_index {
                    prop_assert!(tol.allows(a.data()[i], b.data()[i]));
                }
                prop_assert_eq!(a.shape().ravel(&m.index), Some(m.flat_index));
                prop_assert!(m.max_abs_diff >= m.abs_diff);
            }
        }
    }

    #[test]
    fn synthesized_tensors_follow_shapes_and_domain(
        shapes in prop::collection::vec(arb_shape(), 1..=3),
        seed in any::<u64>(),
        low in -10.0f32..10.0,
        width in 0.5f32..5.0,
    ) {
        let domain = ValueDomain::new(low, low + width).unwrap();
        let domains = vec![domain; shapes.len()];
        let inputs = InputSynthesizer::new(seed).synthesize(&shapes, &domains).unwrap();
        prop_assert_eq!(inputs.len(), shapes.len());
        for (t, s) in inputs.iter().zip(&shapes) {
            prop_assert_eq!(t.shape(), s);
            prop_assert_eq!(t.data().len(), s.numel());
            prop_assert!(t.data().iter().all(|&v| v >= domain.low() && v <= domain.high()));
        }
    }

    #[test]
    fn synthesis_is_deterministic_per_seed(shape in arb_shape(), seed in any::<u64>()) {
        let a = InputSynthesizer::new(seed).tensor(&shape, ValueDomain::SYMMETRIC).unwrap();
        let b = InputSynthesizer::new(seed).tensor(&shape, ValueDomain::SYMMETRIC).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn any_zero_dim_fails_validation(mut dims in prop::collection::vec(1usize..=6, 1..=4), at in any::<prop::sample::Index>()) {
        let i = at.index(dims.len());
        dims[i] = 0;
        let spec = ShapeSpec::same_as_input(vec![Shape::new(dims)], 1);
        prop_assert!(spec.validate(None).is_err());
    }
}
