//! What a training run hands back to the caller.

use crate::forest::RandomForest;
use crate::importance::RankedFeature;
use crate::oob::OobScore;

/// A freshly trained classifier with the scores computed while training it.
///
/// Only training produces an OOB score; a classifier loaded from disk has none.
#[derive(Debug)]
pub struct RandomForestResult {
    forest: RandomForest,
    importances: Vec<RankedFeature>,
    oob_score: Option<OobScore>,
}

impl RandomForestResult {
    pub(crate) fn new(forest: RandomForest, oob_score: Option<OobScore>) -> Self {
        let importances = forest.feature_importances();
        Self {
            forest,
            importances,
            oob_score,
        }
    }

    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Drop the training scores and keep only the classifier.
    #[must_use]
    pub fn into_forest(self) -> RandomForest {
        self.forest
    }

    /// Split into the classifier and its OOB score, as the classify run needs both.
    #[must_use]
    pub fn into_parts(self) -> (RandomForest, Option<OobScore>) {
        (self.forest, self.oob_score)
    }

    /// Track features ranked by mean decrease in impurity, most important first.
    #[must_use]
    pub fn importances(&self) -> &[RankedFeature] {
        &self.importances
    }

    #[must_use]
    pub fn oob_score(&self) -> Option<&OobScore> {
        self.oob_score.as_ref()
    }
}
