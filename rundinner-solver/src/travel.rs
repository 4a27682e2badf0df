//! Dense team-to-team walking distances for one solve.

use rundinner_core::{ConstraintModel, Coordinate, DistanceMatrixProvider, RouteError};

/// Walking distance between every ordered pair of teams, by model index.
///
/// Pairs involving a team without coordinates get a fixed fallback distance.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TravelTable {
    size: usize,
    cells: Vec<f64>,
}

impl TravelTable {
    /// Fetch one matrix over the located teams and spread it over all teams.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`RouteError`].
    pub(crate) fn build<P>(
        model: &ConstraintModel,
        provider: &P,
        unknown_distance_m: f64,
    ) -> Result<Self, RouteError>
    where
        P: DistanceMatrixProvider + ?Sized,
    {
        let size = model.teams().len();
        let located: Vec<(usize, Coordinate)> = model
            .teams()
            .iter()
            .enumerate()
            .filter_map(|(index, team)| team.location.map(|point| (index, point)))
            .collect();
        let points: Vec<Coordinate> = located.iter().map(|&(_, point)| point).collect();
        let matrix = if points.is_empty() {
            None
        } else {
            Some(provider.distance_matrix(&points)?)
        };

        let mut position = vec![None; size];
        for (slot, &(index, _)) in located.iter().enumerate() {
            if let Some(entry) = position.get_mut(index) {
                *entry = Some(slot);
            }
        }

        let mut cells = vec![unknown_distance_m; size.saturating_mul(size)];
        for from in 0..size {
            for to in 0..size {
                let value = if from == to {
                    0.0
                } else {
                    match (position.get(from).copied().flatten(), position.get(to).copied().flatten()) {
                        (Some(a), Some(b)) => matrix
                            .as_ref()
                            .and_then(|m| m.get(a, b))
                            .unwrap_or(unknown_distance_m),
                        _ => unknown_distance_m,
                    }
                };
                if let Some(cell) = cells.get_mut(from * size + to) {
                    *cell = value;
                }
            }
        }
        Ok(Self { size, cells })
    }

    /// Distance from team `from` to team `to`.
    pub(crate) fn get(&self, from: usize, to: usize) -> f64 {
        self.cells
            .get(from.saturating_mul(self.size).saturating_add(to))
            .copied()
            .unwrap_or(0.0)
    }
}
