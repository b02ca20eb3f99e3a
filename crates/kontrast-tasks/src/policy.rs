// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Large-image optimisation policy.
//
// The policy never edits the caller's parameters in place. It returns a new
// bag together with a record of every value it changed and why, and it leaves
// any key the caller set explicitly alone.

use kontrast_core::{ParamValue, ParameterBag};
use kontrast_imaging::{EnhancementSettings, MorphologyOp, MorphologySettings};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::jobs::JobKind;

/// Images above this many pixels always get the optimised settings.
pub const LARGE_IMAGE_PIXELS: u64 = 1_000_000;
/// Images above this many pixels take the simplified path.
pub const HUGE_IMAGE_PIXELS: u64 = 2_000_000;

const OPTIMISED_WINDOW: u32 = 7;
const LARGE_CEILING: u32 = 1000;
const HUGE_CEILING: u32 = 800;
const OPTIMISED_MORPH_KERNEL: u32 = 3;
const OPTIMISED_MORPH_ITERATIONS: u32 = 1;

/// One parameter the policy changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub key: String,
    pub from: ParamValue,
    pub to: ParamValue,
    pub reason: String,
}

/// Parameters to run with, plus what was changed to get them.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationPlan {
    pub params: ParameterBag,
    pub adjustments: Vec<Adjustment>,
}

/// Decides when to trade quality for speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizationPolicy {
    /// Apply the optimised settings to every image, not only large ones.
    pub always: bool,
}

impl OptimizationPolicy {
    pub fn new(always: bool) -> Self {
        Self { always }
    }

    /// Plan the parameters of a `kind` job on a `width` x `height` image.
    /// Colour filters have nothing to trade and pass through.
    pub fn plan(
        &self,
        kind: JobKind,
        params: &ParameterBag,
        width: u32,
        height: u32,
    ) -> OptimizationPlan {
        let pixels = width as u64 * height as u64;
        let mut plan = OptimizationPlan {
            params: params.clone(),
            adjustments: Vec::new(),
        };
        if !(self.always || pixels > LARGE_IMAGE_PIXELS) {
            return plan;
        }

        let reason = if pixels > LARGE_IMAGE_PIXELS {
            format!("image has {pixels} pixels")
        } else {
            "performance optimisations enabled".to_string()
        };
        match kind {
            JobKind::Enhance => plan.enhancement(params, pixels, &reason),
            JobKind::Morphology(op) => plan.morphology(op, params, &reason),
            JobKind::Filter(_) => {}
        }

        for adjustment in &plan.adjustments {
            info!(
                %kind,
                key = %adjustment.key,
                from = %adjustment.from,
                to = %adjustment.to,
                reason = %adjustment.reason,
                "Optimisation applied"
            );
        }
        plan
    }
}

impl OptimizationPlan {
    fn enhancement(&mut self, params: &ParameterBag, pixels: u64, reason: &str) {
        let current = EnhancementSettings::from_bag(params);
        if current.window_size > OPTIMISED_WINDOW {
            self.adjust(
                "window_size",
                current.window_size.into(),
                OPTIMISED_WINDOW.into(),
                reason,
            );
        }
        // Either spelling of the entropy switch counts as the caller's choice.
        if current.use_entropy && !self.params.contains("use_entropy") {
            self.adjust("disable_entropy", false.into(), true.into(), reason);
        }

        if pixels > HUGE_IMAGE_PIXELS {
            let why = format!("image has {pixels} pixels (> {HUGE_IMAGE_PIXELS})");
            if !current.simplified {
                self.adjust("simplified_processing", false.into(), true.into(), &why);
            }
            self.adjust(
                "max_processing_dimension",
                current.max_processing_dimension.into(),
                current.max_processing_dimension.min(HUGE_CEILING).into(),
                &why,
            );
        } else if pixels > LARGE_IMAGE_PIXELS {
            self.adjust(
                "max_processing_dimension",
                current.max_processing_dimension.into(),
                current.max_processing_dimension.min(LARGE_CEILING).into(),
                reason,
            );
        }
    }

    fn morphology(&mut self, op: MorphologyOp, params: &ParameterBag, reason: &str) {
        let current = MorphologySettings::from_bag(op, params);
        self.adjust(
            "kernel_size",
            current.kernel_size.into(),
            OPTIMISED_MORPH_KERNEL.into(),
            reason,
        );
        self.adjust(
            "iterations",
            current.iterations.into(),
            OPTIMISED_MORPH_ITERATIONS.into(),
            reason,
        );
    }

    fn adjust(&mut self, key: &str, from: ParamValue, to: ParamValue, reason: &str) {
        // Caller-supplied values win.
        if self.params.contains(key) || from == to {
            return;
        }
        self.params.insert(key, to.clone());
        self.adjustments.push(Adjustment {
            key: key.to_string(),
            from,
            to,
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENHANCE: JobKind = JobKind::Enhance;

    fn keys(plan: &OptimizationPlan) -> Vec<&str> {
        plan.adjustments.iter().map(|a| a.key.as_str()).collect()
    }

    #[test]
    fn small_images_are_untouched_when_disabled() {
        let bag = ParameterBag::new();
        let plan = OptimizationPolicy::new(false).plan(ENHANCE, &bag, 640, 480);
        assert!(plan.adjustments.is_empty());
        assert_eq!(plan.params, bag);
    }

    #[test]
    fn enabled_policy_shrinks_window_and_skips_entropy() {
        let plan = OptimizationPolicy::new(true).plan(ENHANCE, &ParameterBag::new(), 640, 480);
        assert_eq!(keys(&plan), vec!["window_size", "disable_entropy"]);
        assert_eq!(plan.params.number("window_size"), Some(7.0));
        assert_eq!(plan.params.flag("disable_entropy"), Some(true));
    }

    #[test]
    fn huge_images_take_simplified_path() {
        let plan = OptimizationPolicy::new(false).plan(ENHANCE, &ParameterBag::new(), 3000, 2000);
        assert_eq!(plan.params.flag("simplified_processing"), Some(true));
        assert_eq!(plan.params.number("max_processing_dimension"), Some(800.0));
    }

    #[test]
    fn large_images_get_moderate_ceiling() {
        let plan = OptimizationPolicy::new(false).plan(ENHANCE, &ParameterBag::new(), 1280, 1000);
        assert_eq!(plan.params.number("max_processing_dimension"), Some(1000.0));
        assert_eq!(plan.params.flag("simplified_processing"), None);
    }

    #[test]
    fn explicit_caller_values_are_kept_and_input_not_mutated() {
        let bag = ParameterBag::new()
            .with("window_size", 21.0)
            .with("simplified_processing", false);
        let before = bag.clone();
        let plan = OptimizationPolicy::new(false).plan(ENHANCE, &bag, 3000, 2000);
        assert_eq!(bag, before);
        assert_eq!(plan.params.number("window_size"), Some(21.0));
        assert_eq!(plan.params.flag("simplified_processing"), Some(false));
        assert!(!keys(&plan).contains(&"window_size"));
    }

    #[test]
    fn explicit_entropy_choice_survives_optimisation() {
        let bag = ParameterBag::new().with("use_entropy", true);
        let plan = OptimizationPolicy::new(true).plan(ENHANCE, &bag, 640, 480);
        assert!(!keys(&plan).contains(&"disable_entropy"));
        assert!(EnhancementSettings::from_bag(&plan.params).use_entropy);

        let bag = ParameterBag::new().with("disable_entropy", false);
        let plan = OptimizationPolicy::new(true).plan(ENHANCE, &bag, 640, 480);
        assert!(EnhancementSettings::from_bag(&plan.params).use_entropy);
    }

    #[test]
    fn large_morphology_gets_small_kernel_and_one_pass() {
        let kind = JobKind::Morphology(MorphologyOp::TopHat);
        let plan = OptimizationPolicy::new(false).plan(kind, &ParameterBag::new(), 1280, 1000);
        assert_eq!(keys(&plan), vec!["kernel_size"]);
        let settings = MorphologySettings::from_bag(MorphologyOp::TopHat, &plan.params);
        assert_eq!((settings.kernel_size, settings.iterations), (3, 1));

        let thin = JobKind::Morphology(MorphologyOp::Thinning);
        let bag = ParameterBag::new().with("iterations", 4.0);
        let plan = OptimizationPolicy::new(true).plan(thin, &bag, 64, 64);
        assert_eq!(plan.params.number("iterations"), Some(4.0));
        assert_eq!(plan.params.number("kernel_size"), Some(3.0));

        let small = OptimizationPolicy::new(false).plan(kind, &ParameterBag::new(), 64, 64);
        assert!(small.adjustments.is_empty());
    }

    #[test]
    fn colour_filters_are_never_adjusted() {
        let kind = JobKind::Filter(kontrast_imaging::ColourFilter::Hdr);
        let plan = OptimizationPolicy::new(true).plan(kind, &ParameterBag::new(), 3000, 2000);
        assert!(plan.adjustments.is_empty());
    }
}
