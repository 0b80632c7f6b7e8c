use std::collections::BTreeSet;
use std::f64::consts::PI;

use arbiter::spatial::{
    circle_tiles, cone_tiles, distance, find_path, has_line_of_sight, line_tiles, PathOptions,
    PathOutcome, Point, Tile, MAX_COORD,
};
use proptest::prelude::*;

fn tiles(list: &[(i32, i32)]) -> BTreeSet<Tile> {
    list.iter().map(|&(x, y)| Tile::new(x, y)).collect()
}

#[test]
fn distance_names_the_bad_argument() {
    let ok = Point::new(1.0, 2.0);
    let err = distance(Point::new(f64::NAN, 0.0), ok).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.field(), Some("p1"));

    let err = distance(ok, Point::new(0.0, f64::INFINITY)).unwrap_err();
    assert_eq!(err.field(), Some("p2"));

    assert_eq!(distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)).unwrap(), 5.0);
}

#[test]
fn circle_of_radius_zero_is_its_center() {
    let c = Point::new(4.0, -2.0);
    assert_eq!(circle_tiles(c, 0.0).unwrap(), vec![Tile::new(4, -2)]);
}

#[test]
fn large_circle_approximates_its_area() {
    let count = circle_tiles(Point::new(0.0, 0.0), 100.0).unwrap().len() as f64;
    let area = PI * 100.0 * 100.0;
    assert!((count - area).abs() <= area * 0.1, "{count} tiles vs {area}");
}

#[test]
fn bad_radius_is_rejected() {
    let c = Point::new(0.0, 0.0);
    assert_eq!(circle_tiles(c, -1.0).unwrap_err().field(), Some("radius"));
    assert_eq!(circle_tiles(c, f64::NAN).unwrap_err().field(), Some("radius"));
    assert_eq!(
        circle_tiles(Point::new(f64::NAN, 0.0), 2.0)
            .unwrap_err()
            .field(),
        Some("center")
    );
}

#[test]
fn circle_enumeration_is_row_major() {
    let first = circle_tiles(Point::new(0.0, 0.0), 3.0).unwrap();
    let mut sorted = first.clone();
    sorted.sort();
    assert_eq!(first, sorted);
    assert_eq!(first, circle_tiles(Point::new(0.0, 0.0), 3.0).unwrap());
}

#[test]
fn quarter_cone_facing_east() {
    let cone = cone_tiles(Point::new(0.0, 0.0), Point::new(1.0, 0.0), 2.0, 90.0).unwrap();
    assert_eq!(
        cone,
        vec![
            Tile::new(1, -1),
            Tile::new(0, 0),
            Tile::new(1, 0),
            Tile::new(2, 0),
            Tile::new(1, 1),
        ]
    );
}

#[test]
fn full_cone_matches_circle() {
    let origin = Point::new(2.0, 2.0);
    let cone = cone_tiles(origin, Point::new(0.0, 1.0), 3.0, 360.0).unwrap();
    assert_eq!(cone, circle_tiles(origin, 3.0).unwrap());
}

#[test]
fn cone_rejects_bad_shape() {
    let o = Point::new(0.0, 0.0);
    let east = Point::new(1.0, 0.0);
    assert_eq!(
        cone_tiles(o, Point::new(0.0, 0.0), 3.0, 60.0)
            .unwrap_err()
            .field(),
        Some("direction")
    );
    assert_eq!(cone_tiles(o, east, 3.0, 0.0).unwrap_err().field(), Some("angle"));
    assert_eq!(cone_tiles(o, east, 3.0, 361.0).unwrap_err().field(), Some("angle"));
    assert_eq!(cone_tiles(o, east, -1.0, 60.0).unwrap_err().field(), Some("length"));
    assert!(cone_tiles(o, east, 0.0, 60.0).unwrap().contains(&Tile::new(0, 0)));
}

#[test]
fn horizontal_line_has_sixteen_tiles() {
    let line = line_tiles(Tile::new(0, 5), Tile::new(15, 5)).unwrap();
    assert_eq!(line.len(), 16);
    assert!(line.iter().all(|t| t.y == 5));
    assert_eq!(line.first(), Some(&Tile::new(0, 5)));
    assert_eq!(line.last(), Some(&Tile::new(15, 5)));
}

#[test]
fn line_of_sight_ignores_endpoints() {
    let wall = tiles(&[(2, 0)]);
    assert!(!has_line_of_sight(Tile::new(0, 0), Tile::new(4, 0), &wall).unwrap());
    assert!(has_line_of_sight(Tile::new(0, 0), Tile::new(2, 0), &wall).unwrap());
    assert!(has_line_of_sight(Tile::new(0, 1), Tile::new(4, 1), &wall).unwrap());
    assert!(has_line_of_sight(Tile::new(2, 0), Tile::new(2, 0), &wall).unwrap());
}

#[test]
fn path_to_self_is_a_single_tile() {
    let p = Tile::new(3, 3);
    let outcome = find_path(p, p, &BTreeSet::new(), &PathOptions::default());
    let path = outcome.into_path().unwrap();
    assert_eq!(path.tiles, vec![p]);
    assert_eq!(path.iterations, 0);
}

#[test]
fn path_walks_around_a_wall() {
    let wall = tiles(&[(2, -2), (2, -1), (2, 0), (2, 1), (2, 2)]);
    let path = find_path(
        Tile::new(0, 0),
        Tile::new(4, 0),
        &wall,
        &PathOptions::default(),
    )
    .into_path()
    .unwrap();
    assert_eq!(path.tiles.first(), Some(&Tile::new(0, 0)));
    assert_eq!(path.tiles.last(), Some(&Tile::new(4, 0)));
    assert!(path.tiles.iter().all(|t| !wall.contains(t)));
    assert!(path.tiles.windows(2).all(|w| w[0].is_adjacent(&w[1])));
    assert_eq!(path.cost as usize, path.tiles.len() - 1);
}

#[test]
fn difficult_terrain_doubles_step_cost() {
    let mud = tiles(&[(1, -5), (1, -4), (1, -3), (1, -2), (1, -1), (1, 0), (1, 1), (1, 2), (1, 3), (1, 4), (1, 5)]);
    let options = PathOptions {
        difficult: Some(&mud),
        ..PathOptions::default()
    };
    let path = find_path(Tile::new(0, 0), Tile::new(2, 0), &BTreeSet::new(), &options)
        .into_path()
        .unwrap();
    assert_eq!(path.cost, 3);
}

#[test]
fn enclosed_goal_exhausts_the_budget() {
    let goal = Tile::new(10, 0);
    let ring: BTreeSet<Tile> = (-1..=1)
        .flat_map(|dy| (-1..=1).map(move |dx| goal.offset(dx, dy)))
        .filter(|t| *t != goal)
        .collect();
    let options = PathOptions {
        max_iterations: 500,
        ..PathOptions::default()
    };
    match find_path(Tile::new(0, 0), goal, &ring, &options) {
        PathOutcome::BudgetExhausted { iterations } => assert_eq!(iterations, 500),
        other => panic!("expected budget exhaustion, got {other:?}"),
    }
}

#[test]
fn obstacle_goal_is_unreachable() {
    let goal = Tile::new(1, 1);
    let outcome = find_path(Tile::new(0, 0), goal, &tiles(&[(1, 1)]), &PathOptions::default());
    assert_eq!(outcome, PathOutcome::Unreachable { iterations: 0 });
}

#[test]
fn tiles_accept_keys_or_coordinates() {
    let a: Tile = serde_json::from_value(serde_json::json!("3,-4")).unwrap();
    let b: Tile = serde_json::from_value(serde_json::json!({"x": 3, "y": -4})).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.key(), "3,-4");
    assert!(serde_json::from_value::<Tile>(serde_json::json!("3;4")).is_err());
}

#[test]
fn off_grid_coordinates_are_refused() {
    let edge = f64::from(MAX_COORD);
    let err = circle_tiles(Point::new(f64::from(i32::MAX), 0.0), 1.0).unwrap_err();
    assert_eq!(err.field(), Some("center"));
    assert!(circle_tiles(Point::new(edge, -edge), 2.0).is_ok());

    let far = Tile::new(i32::MAX, 0);
    assert_eq!(line_tiles(Tile::new(0, 0), far).unwrap_err().field(), Some("b"));
    assert!(has_line_of_sight(far, Tile::new(0, 0), &BTreeSet::new()).is_err());
    assert!(serde_json::from_value::<Tile>(serde_json::json!({"x": i32::MAX, "y": 0})).is_err());
    assert!(format!("{},0", MAX_COORD + 1).parse::<Tile>().is_err());

    let corner = Tile::new(MAX_COORD, MAX_COORD);
    let outcome = find_path(corner, corner.offset(1, 0), &BTreeSet::new(), &PathOptions::default());
    assert_eq!(outcome, PathOutcome::Unreachable { iterations: 0 });
    let path = find_path(corner, corner.offset(-2, 0), &BTreeSet::new(), &PathOptions::default());
    assert_eq!(path.into_path().unwrap().tiles.len(), 3);
}

proptest! {
    #[test]
    fn line_length_follows_the_longer_axis(
        ax in -30i32..30, ay in -30i32..30, bx in -30i32..30, by in -30i32..30,
    ) {
        let (a, b) = (Tile::new(ax, ay), Tile::new(bx, by));
        let line = line_tiles(a, b).unwrap();
        let expected = (bx - ax).abs().max((by - ay).abs()) as usize + 1;
        prop_assert_eq!(line.len(), expected);
        prop_assert_eq!(line[0], a);
        prop_assert_eq!(*line.last().unwrap(), b);
    }

    #[test]
    fn path_search_stays_within_budget(
        walls in proptest::collection::btree_set((-8i32..8, -8i32..8), 0..60),
        gx in -8i32..8, gy in -8i32..8,
        budget in 1usize..400,
    ) {
        let obstacles: BTreeSet<Tile> = walls
            .into_iter()
            .map(|(x, y)| Tile::new(x, y))
            .filter(|t| *t != Tile::new(0, 0))
            .collect();
        let options = PathOptions { max_iterations: budget, ..PathOptions::default() };
        let outcome = find_path(Tile::new(0, 0), Tile::new(gx, gy), &obstacles, &options);
        prop_assert!(outcome.iterations() <= budget);
        if let PathOutcome::Found(path) = outcome {
            prop_assert!(path.tiles.iter().all(|t| !obstacles.contains(t)));
            prop_assert!(path.tiles.windows(2).all(|w| w[0].is_adjacent(&w[1])));
        }
    }

    #[test]
    fn circles_contain_their_center(cx in -50i32..50, cy in -50i32..50, r in 0.0f64..20.0) {
        let shape = circle_tiles(Point::new(f64::from(cx), f64::from(cy)), r).unwrap();
        prop_assert!(shape.contains(&Tile::new(cx, cy)));
    }
}
