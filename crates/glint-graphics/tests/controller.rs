//! End-to-end tests driving the controller with raw protocol commands.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use glint_graphics::config::{CacheConfig, DeletionConfig};
use glint_graphics::protocol::ApcScanner;
use glint_graphics::{
    CellSize, GraphicsConfig, GraphicsController, GraphicsHost, GridCoord, PixelRect,
    LAST_IMAGE_KEY,
};

#[derive(Debug)]
struct RecordingHost {
    reports: Vec<String>,
    changes: usize,
    cursor: GridCoord,
    moves: Vec<(i32, i64)>,
    cell: CellSize,
    screen_line: i64,
}

impl RecordingHost {
    fn new() -> Self {
        Self::with_cell(CellSize::new(1.0, 1.0))
    }

    fn with_cell(cell: CellSize) -> Self {
        Self {
            reports: Vec::new(),
            changes: 0,
            cursor: GridCoord::default(),
            moves: Vec::new(),
            cell,
            screen_line: 0,
        }
    }

    fn take_reports(&mut self) -> Vec<String> {
        std::mem::take(&mut self.reports)
    }
}

impl GraphicsHost for RecordingHost {
    fn report(&mut self, message: &str) {
        self.reports.push(message.to_string());
    }

    fn placements_did_change(&mut self) {
        self.changes += 1;
    }

    fn cursor_coordinate(&self) -> GridCoord {
        self.cursor
    }

    fn move_cursor(&mut self, dx: i32, dy: i64) {
        self.moves.push((dx, dy));
        self.cursor = GridCoord::new(self.cursor.x + dx, self.cursor.y + dy);
    }

    fn cell_pixel_size(&self) -> CellSize {
        self.cell
    }

    fn screen_absolute_line(&self) -> i64 {
        self.screen_line
    }
}

/// Base64 of a `width` x `height` RGBA buffer filled with `fill`.
fn rgba(width: usize, height: usize, fill: u8) -> String {
    STANDARD.encode(vec![fill; width * height * 4])
}

fn run(controller: &mut GraphicsController, host: &mut RecordingHost, command: &str) {
    controller.execute_raw(command.as_bytes(), host);
}

fn ok(params: &str) -> String {
    if params.is_empty() {
        "\x1b_GOK\x1b\\".to_string()
    } else {
        format!("\x1b_G{params};OK\x1b\\")
    }
}

// ---------------------------------------------------------------------------
// Transmission
// ---------------------------------------------------------------------------

#[test]
fn test_transmit_stores_and_replies() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=t,i=1,f=32,s=1,v=1;{}", rgba(1, 1, 0)));

    assert_eq!(host.take_reports(), vec![ok("i=1")]);
    let image = controller.image(1).expect("stored");
    assert_eq!((image.width, image.height), (1, 1));
    assert!(controller.placements().is_empty());
    assert_eq!(host.changes, 0);
}

#[test]
fn test_transmit_rgb_and_zlib() {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write as _;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&[0x10, 0x20, 0x30, 0x40, 0x50, 0x60]).unwrap();
    let compressed = STANDARD.encode(encoder.finish().unwrap());

    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=t,i=2,f=24,s=2,v=1,o=z;{compressed}"));

    assert_eq!(host.take_reports(), vec![ok("i=2")]);
    let uuid = controller.image(2).unwrap().uuid;
    let bitmap = controller.bitmap(&uuid).unwrap();
    assert_eq!(bitmap.rgba(), &[0x10, 0x20, 0x30, 0xFF, 0x40, 0x50, 0x60, 0xFF]);
}

#[test]
fn test_zlib_with_maximum_budget() {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write as _;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&[1, 2, 3, 4]).unwrap();
    let compressed = STANDARD.encode(encoder.finish().unwrap());

    let mut controller = GraphicsController::with_config(GraphicsConfig {
        cache: CacheConfig { budget_bytes: u64::MAX },
        ..GraphicsConfig::default()
    });
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=t,i=1,o=z,f=32,s=1,v=1;{compressed}"));

    assert_eq!(host.take_reports(), vec![ok("i=1")]);
    assert!(controller.image(1).is_some());
}

#[test]
fn test_transmit_png() {
    let mut png = std::io::Cursor::new(Vec::new());
    image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]))
        .write_to(&mut png, image::ImageFormat::Png)
        .unwrap();

    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let payload = STANDARD.encode(png.into_inner());
    run(&mut controller, &mut host, &format!("a=t,i=5,f=100;{payload}"));

    assert_eq!(host.take_reports(), vec![ok("i=5")]);
    let image = controller.image(5).unwrap();
    assert_eq!((image.width, image.height), (3, 2));
}

#[test]
fn test_bad_payload_is_reported() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, "a=t,i=1,f=32,s=2,v=2;AAAAAA==");
    run(&mut controller, &mut host, "a=t,i=2,f=32,s=1,v=1;!!!!");
    run(&mut controller, &mut host, "a=t,i=3,t=f,f=32,s=1,v=1;L3RtcC9pbWFnZQ==");

    assert_eq!(
        host.take_reports(),
        vec![
            "\x1b_Gi=1;invalid payload\x1b\\".to_string(),
            "\x1b_Gi=2;could not decode payload\x1b\\".to_string(),
            "\x1b_Gi=3;EBADF:Unimplemented\x1b\\".to_string(),
        ]
    );
    assert!(controller.images().is_empty());
}

#[test]
fn test_verbosity_levels() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);

    run(&mut controller, &mut host, &format!("a=t,i=1,f=32,s=1,v=1,q=1;{pixel}"));
    run(&mut controller, &mut host, &format!("a=t,i=2,f=32,s=1,v=1,q=2;{pixel}"));
    assert!(host.take_reports().is_empty());

    run(&mut controller, &mut host, "a=t,i=3,f=32,s=5,v=5,q=1;AAAA");
    run(&mut controller, &mut host, "a=t,i=4,f=32,s=5,v=5,q=2;AAAA");
    assert_eq!(host.take_reports(), vec!["\x1b_Gi=3;invalid payload\x1b\\".to_string()]);
}

#[test]
fn test_multipart_matches_single_transfer() {
    let payload = rgba(2, 1, 7);
    let (head, tail) = payload.split_at(5);

    let mut chunked = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut chunked, &mut host, &format!("a=T,i=3,f=32,s=2,v=1,m=1;{head}"));
    assert!(host.reports.is_empty());
    assert!(chunked.is_receiving());
    assert!(chunked.image(3).is_none());
    run(&mut chunked, &mut host, &format!("m=0;{tail}"));

    let mut whole = GraphicsController::new();
    let mut other = RecordingHost::new();
    run(&mut whole, &mut other, &format!("a=T,i=3,f=32,s=2,v=1;{payload}"));

    assert!(!chunked.is_receiving());
    assert_eq!(host.reports, other.reports);
    assert_eq!(host.moves, other.moves);
    let a = chunked.bitmap(&chunked.image(3).unwrap().uuid).unwrap();
    let b = whole.bitmap(&whole.image(3).unwrap().uuid).unwrap();
    assert_eq!(a.rgba(), b.rgba());
}

#[test]
fn test_oversized_transfer_is_rejected() {
    let mut config = GraphicsConfig::default();
    config.transfer.max_accumulated_bytes = 8;
    let mut controller = GraphicsController::with_config(config);
    let mut host = RecordingHost::new();

    run(&mut controller, &mut host, "a=t,i=1,f=32,s=2,v=2,m=1;AAAAAAAA");
    run(&mut controller, &mut host, "m=1;AAAA");
    assert_eq!(host.take_reports(), vec!["\x1b_Gi=1;EFBIG:Transmission exceeds 8 bytes\x1b\\".to_string()]);
    assert!(!controller.is_receiving());
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[test]
fn test_image_number_allocates_identifier() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);

    run(&mut controller, &mut host, &format!("a=t,i=1,f=32,s=1,v=1;{pixel}"));
    run(&mut controller, &mut host, &format!("a=t,I=13,f=32,s=1,v=1;{pixel}"));
    run(&mut controller, &mut host, &format!("a=t,i=7,I=13,f=32,s=1,v=1;{pixel}"));
    assert_eq!(
        host.take_reports(),
        vec![
            ok("i=1"),
            ok("i=2,I=13"),
            "\x1b_Gi=7,I=13;EINVAL:Can't give both i and I\x1b\\".to_string(),
        ]
    );
    assert_eq!(controller.image(2).unwrap().number(), 13);

    run(&mut controller, &mut host, "a=p,I=13");
    assert_eq!(host.take_reports(), vec![ok("I=13")]);
    assert_eq!(controller.placements().iter().next().unwrap().image_id(), 2);

    run(&mut controller, &mut host, "a=d,d=n,I=13");
    assert!(controller.image(2).is_none());
    assert!(controller.placements().is_empty());
}

#[test]
fn test_transmission_without_id_is_last_image() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=t,f=32,s=1,v=1;{}", rgba(1, 1, 0)));

    assert_eq!(host.take_reports(), vec![ok("")]);
    assert!(controller.images().contains(LAST_IMAGE_KEY));

    run(&mut controller, &mut host, "a=p,q=2");
    assert_eq!(controller.placements().len(), 1);
}

#[test]
fn test_query_does_not_replace_stored_image() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=t,i=4,f=32,s=1,v=1,q=2;{}", rgba(1, 1, 0)));
    let stored = controller.image(4).unwrap().uuid;

    run(&mut controller, &mut host, &format!("a=q,i=4,f=32,s=1,v=1;{}", rgba(1, 1, 9)));
    assert_eq!(host.take_reports(), vec![ok("i=4")]);
    assert_eq!(controller.image(4).unwrap().uuid, stored);
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[test]
fn test_transmit_and_display_moves_cursor() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=T,i=1,f=32,s=2,v=1;{}", rgba(2, 1, 0)));

    assert_eq!(host.take_reports(), vec![ok("i=1")]);
    assert_eq!(host.changes, 1);
    assert_eq!(host.moves, vec![(2, 1)]);

    let draws = controller.draws(&host);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].destination, PixelRect::new(0.0, 0.0, 2.0, 1.0));
    assert_eq!(draws[0].source, PixelRect::new(0.0, 0.0, 2.0, 1.0));
    assert_eq!(draws[0].image_id, 1);
}

#[test]
fn test_rgb_scenario_then_delete_by_id() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, "a=T,i=7,f=24,s=2,v=1;AAAAAAAA");

    assert_eq!(controller.placements().len(), 1);
    assert_eq!(host.moves, vec![(2, 1)]);
    assert_eq!(host.cursor, GridCoord::new(2, 1));
    assert_eq!(controller.draws(&host).len(), 1);

    run(&mut controller, &mut host, "a=d,d=i,i=7");
    assert!(controller.image(7).is_none());
    assert!(controller.placements().is_empty());
    assert!(controller.draws(&host).is_empty());
    assert_eq!(host.changes, 2);
}

#[test]
fn test_cursor_stays_when_asked() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=T,i=1,C=1,f=32,s=2,v=1;{}", rgba(2, 1, 0)));
    run(&mut controller, &mut host, "a=p,i=1,p=2,U=1");
    assert!(host.moves.is_empty());
    assert_eq!(controller.placements().len(), 2);
}

#[test]
fn test_put_placement_geometry() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::with_cell(CellSize::new(10.0, 20.0));
    host.cursor = GridCoord::new(3, 4);
    run(&mut controller, &mut host, &format!("a=t,i=1,q=2,f=32,s=8,v=6;{}", rgba(8, 6, 0)));

    run(&mut controller, &mut host, "a=p,i=1,p=1,c=4,r=2,X=3,Y=5,q=2");
    let draws = controller.draws(&host);
    assert_eq!(draws[0].destination, PixelRect::new(33.0, 85.0, 40.0, 40.0));
    assert_eq!(draws[0].placement_size.columns, 4);
    assert_eq!(host.moves, vec![(5, 3)]);

    // Source rect with only a height; the width runs to the image edge.
    run(&mut controller, &mut host, "a=p,i=1,p=1,x=2,h=3,C=1,q=2");
    let draws = controller.draws(&host);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].destination.size().width, 6.0);
    assert_eq!(draws[0].source, PixelRect::new(2.0, 3.0, 6.0, 3.0));
}

#[test]
fn test_put_missing_image() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, "a=p,i=9,p=2");
    run(&mut controller, &mut host, "a=p,I=4");
    run(&mut controller, &mut host, "a=p");

    assert_eq!(
        host.take_reports(),
        vec![
            "\x1b_Gi=9,p=2;ENOENT:Put command refers to non-existent image with id: 9 and number: 0\x1b\\"
                .to_string(),
            "\x1b_GI=4;ENOENT:Put command refers to non-existent image with id: 0 and number: 4\x1b\\"
                .to_string(),
        ]
    );
    assert_eq!(host.changes, 0);
}

#[test]
fn test_z_order() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    for (id, z) in [(1, 3), (2, -1), (3, 0)] {
        run(&mut controller, &mut host, &format!("a=T,i={id},z={z},q=2,f=32,s=1,v=1;{pixel}"));
    }

    let order: Vec<i32> = controller.draws(&host).iter().map(|d| d.z_index).collect();
    assert_eq!(order, vec![-1, 0, 3]);
}

#[test]
fn test_equal_z_ordered_by_image_id() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    for id in [9, 4, 6] {
        run(&mut controller, &mut host, &format!("a=T,i={id},q=2,f=32,s=1,v=1;{pixel}"));
    }

    let ids: Vec<u32> = controller.draws(&host).iter().map(|d| d.image_id).collect();
    assert_eq!(ids, vec![4, 6, 9]);
}

#[test]
fn test_same_placement_id_replaces() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=t,i=1,q=2,f=32,s=1,v=1;{}", rgba(1, 1, 0)));
    run(&mut controller, &mut host, "a=p,i=1,p=1,q=2");
    run(&mut controller, &mut host, "a=p,i=1,p=1,q=2");
    run(&mut controller, &mut host, "a=p,i=1,q=2");
    run(&mut controller, &mut host, "a=p,i=1,q=2");
    assert_eq!(controller.placements().len(), 3);
}

// ---------------------------------------------------------------------------
// Relative placements
// ---------------------------------------------------------------------------

#[test]
fn test_relative_placement_follows_parent() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    run(&mut controller, &mut host, &format!("a=T,i=1,p=1,q=2,f=32,s=1,v=1;{pixel}"));
    run(&mut controller, &mut host, &format!("a=T,i=2,p=2,P=1,Q=1,H=2,V=-1,q=2,f=32,s=1,v=1;{pixel}"));

    assert_eq!(host.moves, vec![(1, 1)]);
    let draws = controller.draws(&host);
    let child = draws.iter().find(|d| d.image_id == 2).unwrap();
    assert_eq!(child.destination, PixelRect::new(2.0, -1.0, 1.0, 1.0));
}

#[test]
fn test_relative_placement_errors() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    run(&mut controller, &mut host, &format!("a=T,i=1,p=1,q=1,f=32,s=1,v=1;{pixel}"));
    run(&mut controller, &mut host, &format!("a=T,i=2,p=2,P=1,Q=1,q=1,f=32,s=1,v=1;{pixel}"));
    assert!(host.take_reports().is_empty());

    run(&mut controller, &mut host, "a=p,i=1,p=1,P=2,Q=2");
    run(&mut controller, &mut host, "a=p,i=2,p=3,P=1,Q=7");
    run(&mut controller, &mut host, "a=p,i=2,p=4,U=1,P=1,Q=1");
    assert_eq!(
        host.take_reports(),
        vec![
            "\x1b_Gi=1,p=1;ECYCLE:Placement would form a cycle\x1b\\".to_string(),
            "\x1b_Gi=2,p=3;ENOPARENT:Parent placement not found\x1b\\".to_string(),
            "\x1b_Gi=2,p=4;EINVAL:Virtual placement cannot have a parent\x1b\\".to_string(),
        ]
    );
    assert_eq!(controller.placements().len(), 2);
}

#[test]
fn test_delete_cascades_to_children() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    run(&mut controller, &mut host, &format!("a=T,i=1,p=1,q=2,f=32,s=1,v=1;{pixel}"));
    run(&mut controller, &mut host, &format!("a=T,i=2,p=2,P=1,Q=1,q=2,f=32,s=1,v=1;{pixel}"));
    run(&mut controller, &mut host, &format!("a=T,i=3,p=3,P=2,Q=2,q=2,f=32,s=1,v=1;{pixel}"));
    run(&mut controller, &mut host, &format!("a=T,i=4,q=2,f=32,s=1,v=1;{pixel}"));
    let changes = host.changes;

    run(&mut controller, &mut host, "a=d,d=i,i=1");
    assert!(controller.image(1).is_none());
    assert!(controller.image(2).is_some());
    assert_eq!(controller.placements().len(), 1);
    assert_eq!(controller.placements().iter().next().unwrap().image_id(), 4);
    assert_eq!(host.changes, changes + 1);
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[test]
fn test_delete_selectors_include_virtual_placements() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=T,i=1,z=3,q=2,f=32,s=1,v=1;{}", rgba(1, 1, 0)));
    run(&mut controller, &mut host, "a=p,i=1,p=5,U=1,z=3,q=2");
    run(&mut controller, &mut host, "a=p,i=1,p=6,U=1,q=2");

    run(&mut controller, &mut host, "a=d,d=z,z=3");
    assert_eq!(controller.placements().len(), 1);
    assert_eq!(controller.placements().iter().next().unwrap().placement_id, 6);

    run(&mut controller, &mut host, "a=d");
    assert!(controller.placements().is_empty());
    assert!(controller.image(1).is_some());
}

#[test]
fn test_delete_spares_virtual_placements_when_configured() {
    let config = GraphicsConfig {
        deletion: DeletionConfig {
            spare_virtual_placements: true,
            ..DeletionConfig::default()
        },
        ..GraphicsConfig::default()
    };
    let mut controller = GraphicsController::with_config(config);
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=T,i=1,z=3,q=2,f=32,s=1,v=1;{}", rgba(1, 1, 0)));
    run(&mut controller, &mut host, "a=p,i=1,p=5,U=1,z=3,q=2");

    run(&mut controller, &mut host, "a=d,d=z,z=3");
    assert_eq!(controller.placements().len(), 1);
    assert!(controller.placements().iter().all(|p| p.is_virtual));

    run(&mut controller, &mut host, "a=d");
    assert_eq!(controller.placements().len(), 1);

    run(&mut controller, &mut host, "a=d,d=i,i=1,p=5");
    assert!(controller.placements().is_empty());
    assert!(controller.image(1).is_some());
}

#[test]
fn test_delete_everything() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=T,i=1,q=2,f=32,s=1,v=1;{}", rgba(1, 1, 0)));
    run(&mut controller, &mut host, "a=p,i=1,p=5,U=1,q=2");

    run(&mut controller, &mut host, "a=d,d=");
    assert!(controller.placements().is_empty());
    assert!(controller.images().is_empty());
    assert!(controller.draws(&host).is_empty());
}

#[test]
fn test_delete_by_id_keeps_placements_when_not_cascading() {
    let config = GraphicsConfig {
        deletion: DeletionConfig {
            cascade_on_id: false,
            ..DeletionConfig::default()
        },
        ..GraphicsConfig::default()
    };
    let mut controller = GraphicsController::with_config(config);
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=T,i=1,q=2,f=32,s=1,v=1;{}", rgba(1, 1, 0)));

    run(&mut controller, &mut host, "a=d,d=i,i=1");
    assert!(controller.image(1).is_none());
    assert_eq!(controller.placements().len(), 1);
    assert_eq!(controller.draws(&host).len(), 1);
}

#[test]
fn test_delete_by_position() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    // Placements on the diagonal: (0,0), (1,1), (2,2).
    for id in 1..=3 {
        run(&mut controller, &mut host, &format!("a=T,i={id},z={id},q=2,f=32,s=1,v=1;{pixel}"));
    }
    let ids = |c: &GraphicsController| -> Vec<u32> {
        let mut ids: Vec<u32> = c.placements().iter().map(|p| p.image_id()).collect();
        ids.sort_unstable();
        ids
    };

    // 1-based column 2 is placement 2.
    run(&mut controller, &mut host, "a=d,d=x,x=2");
    assert_eq!(ids(&controller), vec![1, 3]);

    // Row 3 after scrolling one line: absolute row 3 holds nothing.
    host.screen_line = 1;
    run(&mut controller, &mut host, "a=d,d=y,y=3");
    assert_eq!(ids(&controller), vec![1, 3]);
    run(&mut controller, &mut host, "a=d,d=y,y=2");
    assert_eq!(ids(&controller), vec![1]);
    host.screen_line = 0;

    run(&mut controller, &mut host, "a=d,d=z,z=2");
    assert_eq!(ids(&controller), vec![1]);
    run(&mut controller, &mut host, "a=d,d=p,x=1,y=1");
    assert!(ids(&controller).is_empty());
}

#[test]
fn test_delete_at_cursor_and_z_cell() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    run(&mut controller, &mut host, &format!("a=T,i=1,C=1,z=5,q=2,f=32,s=1,v=1;{pixel}"));
    run(&mut controller, &mut host, &format!("a=T,i=2,C=1,z=6,q=2,f=32,s=1,v=1;{pixel}"));

    run(&mut controller, &mut host, "a=d,d=q,x=0,y=0,z=6");
    assert_eq!(controller.placements().len(), 1);
    run(&mut controller, &mut host, "a=d,d=c");
    assert!(controller.placements().is_empty());
}

#[test]
fn test_delete_id_range() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    for id in 1..=5 {
        run(&mut controller, &mut host, &format!("a=T,i={id},q=2,f=32,s=1,v=1;{pixel}"));
    }

    run(&mut controller, &mut host, "a=d,d=r,x=2,y=4");
    let mut kept: Vec<u32> = controller.placements().iter().map(|p| p.image_id()).collect();
    kept.sort_unstable();
    assert_eq!(kept, vec![1, 5]);
    assert!(controller.image(3).is_none());
    assert!(controller.image(5).is_some());
}

#[test]
fn test_unknown_delete_and_animation_are_ignored() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=T,i=1,q=2,f=32,s=1,v=1;{}", rgba(1, 1, 0)));
    let changes = host.changes;

    run(&mut controller, &mut host, "a=d,d=w");
    run(&mut controller, &mut host, "a=d,d=f,i=1");
    run(&mut controller, &mut host, "a=a,i=1,s=3");
    assert_eq!(controller.placements().len(), 1);
    assert_eq!(host.changes, changes);
    assert!(host.reports.is_empty());
}

// ---------------------------------------------------------------------------
// Cache budget
// ---------------------------------------------------------------------------

fn small_cache(budget_bytes: u64) -> GraphicsController {
    GraphicsController::with_config(GraphicsConfig {
        cache: CacheConfig { budget_bytes },
        ..GraphicsConfig::default()
    })
}

#[test]
fn test_eviction_drops_pixels_but_keeps_placements() {
    let mut controller = small_cache(8);
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    for id in 1..=3 {
        run(&mut controller, &mut host, &format!("a=T,i={id},q=2,f=32,s=1,v=1;{pixel}"));
    }

    assert!(controller.image(1).is_none());
    assert!(controller.image(3).is_some());
    assert_eq!(controller.images().total_cost(), 8);
    assert_eq!(controller.placements().len(), 3);
    let drawn: Vec<u32> = controller.draws(&host).iter().map(|d| d.image_id).collect();
    assert_eq!(drawn, vec![2, 3]);
}

#[test]
fn test_image_larger_than_budget() {
    let mut controller = small_cache(8);
    let mut host = RecordingHost::new();
    run(&mut controller, &mut host, &format!("a=t,i=1,f=32,s=1,v=1;{}", rgba(1, 1, 0)));
    run(&mut controller, &mut host, &format!("a=T,i=2,f=32,s=3,v=1;{}", rgba(3, 1, 0)));

    assert_eq!(
        host.take_reports(),
        vec![ok("i=1"), "\x1b_Gi=2;ENOSPC:Image exceeds cache budget\x1b\\".to_string()]
    );
    assert!(controller.image(1).is_some());
    assert!(controller.image(2).is_none());
    assert!(controller.placements().is_empty());
}

// ---------------------------------------------------------------------------
// Byte stream and lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_apc_stream_split_across_reads() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let mut scanner = ApcScanner::new();
    let stream = format!("text\x1b_Ga=T,i=8,f=32,s=1,v=1;{}\x1b\\more text", rgba(1, 1, 0));

    for piece in stream.as_bytes().chunks(3) {
        for body in scanner.feed(piece) {
            controller.execute_raw(&body, &mut host);
        }
    }

    assert_eq!(host.take_reports(), vec![ok("i=8")]);
    assert_eq!(controller.draws(&host).len(), 1);
}

#[test]
fn test_malformed_command_is_dropped() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    controller.execute_raw(b"a=t,i=1,\xff\xfe;AAAA", &mut host);
    controller.execute_raw(b"a=t,i=1,f=7;AAAA", &mut host);
    assert!(host.reports.is_empty());
    assert!(controller.images().is_empty());
}

#[test]
fn test_clear_resets_everything() {
    let mut controller = GraphicsController::new();
    let mut host = RecordingHost::new();
    let pixel = rgba(1, 1, 0);
    run(&mut controller, &mut host, &format!("a=T,i=1,q=2,f=32,s=1,v=1;{pixel}"));
    run(&mut controller, &mut host, "a=t,i=2,f=32,s=1,v=1,m=1;AAAA");
    let changes = host.changes;

    controller.clear(&mut host);
    assert!(controller.images().is_empty());
    assert!(controller.placements().is_empty());
    assert!(!controller.is_receiving());
    assert_eq!(host.changes, changes + 1);

    controller.clear(&mut host);
    assert_eq!(host.changes, changes + 1);
}
