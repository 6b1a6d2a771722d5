//! Spawn, combat and threat scenarios driven through the driver (S5, S6).

mod common;

use common::{TestServer, attack_packet, sends_to, wolf_group, wolf_template};
use tmserv_core::Environment;
use tmserv_proto::Opcode;
use tmserv_world::{AiState, TemplateCatalog, World, WorldClock};
use tmserv_world::spawn::SpawnGroupConfig;
use tmserv_world::template::MobTemplate;

fn world_with(template: MobTemplate, group: SpawnGroupConfig) -> World {
    let catalog = TemplateCatalog::from_templates(vec![template]).expect("catalog");
    World::new(catalog, vec![group], WorldClock::default())
}

#[test]
fn s5_group_populates_and_announces_spawns() {
    let mut template = wolf_template();
    template.aggressive = false;
    let mut server = TestServer::with_world(world_with(template, wolf_group(6)));
    server.login(1, "alice", 100, 100);

    // One player on the map: density 0.525, target 3 of max 6.
    let mut spawn_packets = 0;
    for _ in 0..400 {
        let actions = server.tick();
        spawn_packets += sends_to(&actions, 1)
            .iter()
            .filter(|p| p.opcode() == Opcode::EntitySpawn.to_u16())
            .count();
    }

    assert_eq!(server.driver.world().spawner.mob_ids().len(), 3);
    assert_eq!(spawn_packets, 3, "every spawn inside view radius is announced");
}

#[test]
fn s5_killed_mob_respawns_within_the_delay_window() {
    let mut template = wolf_template();
    template.aggressive = false;
    let mut group = wolf_group(2);
    group.radius = 0; // spawn exactly at (100, 100), in melee reach
    let mut server = TestServer::with_world(world_with(template, group));
    server.login(1, "alice", 100, 100);

    // Wait for the single target-count slot to fill.
    let mut mob_id = None;
    for _ in 0..200 {
        server.tick();
        if let Some(&id) = server.driver.world().spawner.mob_ids().first() {
            mob_id = Some(id);
            break;
        }
    }
    let mob_id = mob_id.expect("first spawn");

    // Beat it down.
    let mut died_at_ms = None;
    for _ in 0..100 {
        server.env.advance(150);
        let actions = server.packet(1, attack_packet(mob_id));
        let despawned = sends_to(&actions, 1)
            .iter()
            .any(|p| p.opcode() == Opcode::EntityDespawn.to_u16());
        if despawned {
            died_at_ms = Some(server.env.now().0);
            break;
        }
    }
    let died_at = died_at_ms.expect("mob died to player attacks");
    assert!(!server.driver.world().spawner.mob(mob_id).expect("corpse retained").is_alive());

    // Exactly one replacement appears within [5s, 10s] of the death.
    let mut respawn_at = None;
    loop {
        server.tick();
        let now = server.env.now().0;
        let live = server
            .driver
            .world()
            .spawner
            .mob_ids()
            .iter()
            .filter(|&&id| server.driver.world().spawner.mob(id).is_some_and(|m| m.is_alive()))
            .count();
        if live == 1 {
            respawn_at = Some(now);
            break;
        }
        assert!(now < died_at + 12_000, "no respawn before the window closed");
    }

    let elapsed = respawn_at.expect("respawned") - died_at;
    assert!(
        (5000..=10_200).contains(&elapsed),
        "respawn after {elapsed} ms, expected within [5s, 10s]"
    );
}

#[test]
fn attack_results_are_broadcast_to_observers() {
    let mut template = wolf_template();
    template.aggressive = false;
    let mut group = wolf_group(2);
    group.radius = 0;
    let mut server = TestServer::with_world(world_with(template, group));
    server.login(1, "alice", 100, 100);
    server.login(2, "bob", 102, 100);

    for _ in 0..200 {
        server.tick();
        if !server.driver.world().spawner.mob_ids().is_empty() {
            break;
        }
    }
    let mob_id = server.driver.world().spawner.mob_ids()[0];
    let alice = server.char_id(1);

    server.env.advance(150);
    let actions = server.packet(1, attack_packet(mob_id));

    // Both characters observe the outcome.
    for session in [1u32, 2] {
        let hit = sends_to(&actions, session)
            .iter()
            .any(|p| {
                p.opcode() == Opcode::AttackResult.to_u16()
                    && u16::from_le_bytes([p.payload[0], p.payload[1]]) == alice
            });
        assert!(hit, "session {session} should see the attack result");
    }
}

#[test]
fn s6_threat_drives_target_selection_and_release() {
    let mut template = wolf_template();
    template.aggressive = false;
    // Enough hit points that the threat flip always happens before death.
    template.max_hp = 2000;
    let mut group = wolf_group(2);
    group.radius = 0;
    let mut server = TestServer::with_world(world_with(template, group));
    server.login(1, "xavier", 100, 100);
    server.login(2, "yvonne", 101, 100);

    for _ in 0..200 {
        server.tick();
        if !server.driver.world().spawner.mob_ids().is_empty() {
            break;
        }
    }
    let mob_id = server.driver.world().spawner.mob_ids()[0];
    let x_char = server.char_id(1);
    let y_char = server.char_id(2);

    // X lands the first hit: the idle mob turns on X.
    server.env.advance(150);
    server.packet(1, attack_packet(mob_id));
    server.tick();

    let mob = server.driver.world().spawner.mob(mob_id).expect("present");
    assert_eq!(mob.target, Some(x_char));
    assert!(matches!(mob.ai_state, AiState::Chase | AiState::Attack));

    // Y outdamages X; the next refresh switches targets.
    for _ in 0..20 {
        server.env.advance(150);
        server.packet(2, attack_packet(mob_id));
        let mob = server.driver.world().spawner.mob(mob_id).expect("present");
        if !mob.is_alive() {
            panic!("mob died before the threat flip; lower the attack count");
        }
        if mob.threat.threat_of(y_char) > mob.threat.threat_of(x_char) {
            break;
        }
    }
    server.tick();

    let mob = server.driver.world().spawner.mob(mob_id).expect("present");
    assert!(
        mob.threat.threat_of(y_char) > mob.threat.threat_of(x_char),
        "Y must accumulate more threat than X"
    );
    assert_eq!(mob.target, Some(y_char));

    // Nobody attacks for longer than the threat window: aggression
    // releases and the mob walks home to idle.
    for _ in 0..80 {
        server.tick();
        let mob = server.driver.world().spawner.mob(mob_id).expect("present");
        if mob.ai_state == AiState::Idle && mob.threat.is_empty() {
            break;
        }
    }

    let mob = server.driver.world().spawner.mob(mob_id).expect("present");
    assert!(mob.threat.is_empty(), "threat entries expired");
    assert_eq!(mob.ai_state, AiState::Idle);
    assert_eq!(mob.position, mob.home);
    assert_eq!(mob.vitals.hp, mob.vitals.max_hp, "leash reset heals the mob");
}
