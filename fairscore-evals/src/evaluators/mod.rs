// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Built-in metric evaluators

pub mod calibration;
pub mod faithfulness;
pub mod interpretability;
pub mod robustness;
pub mod safety;

pub use calibration::{CalibrationEvaluator, CalibrationScore, CalibrationSummary, ReliabilityBin};
pub use faithfulness::{FaithfulnessEvaluator, FaithfulnessScore};
pub use interpretability::{InterpretabilityEvaluator, InterpretabilityScore, ReasoningStructure};
pub use robustness::{
    AnalysisMode, AxisResult, PerturbationAxis, RobustnessEvaluator, RobustnessScore,
};
pub use safety::{HarmDetection, SafetyEvaluator, SafetyScore, SafetySummary};
