use crate::common::spaces::BoxSpace;

use super::protocol::GameState;

pub const MAX_ASTEROIDS: usize = 10;
pub const SHIP_FEATURES: usize = 4;
pub const ASTEROID_FEATURES: usize = 5;
pub const OBS_SIZE: usize = SHIP_FEATURES + MAX_ASTEROIDS * ASTEROID_FEATURES;

pub const SCREEN_WIDTH: f32 = 1024.0;
pub const SCREEN_HEIGHT: f32 = 768.0;
pub const SHIP_VELOCITY_SCALE: f32 = 500.0;
pub const ASTEROID_VELOCITY_SCALE: f32 = 300.0;
pub const ASTEROID_RADIUS_SCALE: f32 = 50.0;

/// Flattens a game state into a fixed-length, roughly unit-scaled vector.
///
/// Layout: ship `(x, y, vx, vy)` followed by `MAX_ASTEROIDS` blocks of
/// `(x, y, vx, vy, radius)`. Asteroids past the limit are dropped and
/// unused blocks stay zero.
pub fn encode(state: &GameState) -> Vec<f32> {
    let mut obs = zeroed();

    let ship = &state.starship;
    obs[..SHIP_FEATURES].copy_from_slice(&[
        ship.x / SCREEN_WIDTH,
        ship.y / SCREEN_HEIGHT,
        ship.vx / SHIP_VELOCITY_SCALE,
        ship.vy / SHIP_VELOCITY_SCALE,
    ]);

    let slots = obs[SHIP_FEATURES..].chunks_exact_mut(ASTEROID_FEATURES);
    for (slot, a) in slots.zip(state.asteroids.iter()) {
        slot.copy_from_slice(&[
            a.x / SCREEN_WIDTH,
            a.y / SCREEN_HEIGHT,
            a.vx / ASTEROID_VELOCITY_SCALE,
            a.vy / ASTEROID_VELOCITY_SCALE,
            a.radius / ASTEROID_RADIUS_SCALE,
        ]);
    }

    obs
}

pub fn zeroed() -> Vec<f32> {
    vec![0.0; OBS_SIZE]
}

pub fn observation_space() -> BoxSpace<Vec<f32>> {
    BoxSpace::unbounded(OBS_SIZE)
}

#[cfg(test)]
mod test {
    use assert_approx_eq::assert_approx_eq;

    use crate::common::spaces::Space;
    use crate::env::starship::protocol::{AsteroidState, GameState, ShipState};

    use super::{encode, observation_space, zeroed, OBS_SIZE};

    fn state(n_asteroids: usize) -> GameState {
        GameState {
            starship: ShipState {
                x: 512.0,
                y: 384.0,
                vx: 250.0,
                vy: -500.0,
            },
            asteroids: (0..n_asteroids)
                .map(|i| AsteroidState {
                    x: 1024.0,
                    y: 768.0,
                    vx: 150.0,
                    vy: -300.0,
                    radius: 10.0 * (i + 1) as f32,
                })
                .collect(),
            reward: 0.0,
            game_over: false,
        }
    }

    #[test]
    fn test_ship_features() {
        let obs = encode(&state(0));

        assert_eq!(obs.len(), OBS_SIZE);
        assert_approx_eq!(obs[0], 0.5);
        assert_approx_eq!(obs[1], 0.5);
        assert_approx_eq!(obs[2], 0.5);
        assert_approx_eq!(obs[3], -1.0);
        assert!(obs[4..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_asteroids_are_padded() {
        let obs = encode(&state(2));

        assert_eq!(obs.len(), OBS_SIZE);
        assert_eq!(&obs[4..9], &[1.0, 1.0, 0.5, -1.0, 0.2]);
        assert_eq!(&obs[9..14], &[1.0, 1.0, 0.5, -1.0, 0.4]);
        assert!(obs[14..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_extra_asteroids_are_dropped() {
        let obs = encode(&state(13));

        assert_eq!(obs.len(), OBS_SIZE);
        // tenth asteroid fills the last block
        assert_approx_eq!(obs[OBS_SIZE - 1], 2.0);
    }

    #[test]
    fn test_zeroed_fits_space() {
        let obs = zeroed();

        assert_eq!(obs.len(), OBS_SIZE);
        assert!(observation_space().contains(&obs));
        assert!(observation_space().contains(&encode(&state(4))));
    }
}
