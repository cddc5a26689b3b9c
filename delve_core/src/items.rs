use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Index of an item type in its [`ItemCatalog`].
pub type ItemId = usize;

/// Damage and stun dealt by one melee hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attack {
    pub damage: u32,
    pub stun: u32,
}

/// What happens when an item is used. Dispatch is a `match` on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemEffect {
    /// Opens an adjacent door; magical keys also dissolve barriers.
    Unlock { magical: bool },
    /// Propagates vision from every visible transparent cell, `rounds` times.
    Seeing { rounds: u32 },
    Revelation { greater: bool },
    Teleport { greater: bool },
    Retreat,
    Scry,
    Blink,
    Demolish,
    Heal,
    RestoreMana,
    StunBomb,
    Wield(Attack),
}

/// What the caller must supply before an item can take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Targeting {
    None,
    Direction,
    Location,
}

/// Immutable definition of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
    pub name: String,
    pub long_name: String,
    pub description: String,
    /// Cost in gold; also the loot budget it consumes.
    pub value: u32,
    pub usable: bool,
    /// Whether a successful use removes one from the inventory.
    pub consumable: bool,
    pub directional: bool,
    pub stuns: bool,
    pub mana_cost: u32,
    pub turn_cost: u32,
    pub effect: ItemEffect,
}

impl ItemType {
    fn new(name: &str, long_name: &str, description: &str, value: u32, effect: ItemEffect) -> Self {
        ItemType {
            name: name.to_string(),
            long_name: long_name.to_string(),
            description: description.to_string(),
            value,
            usable: true,
            consumable: true,
            directional: false,
            stuns: false,
            mana_cost: 0,
            turn_cost: 1,
            effect,
        }
    }

    fn directional(mut self) -> Self {
        self.directional = true;
        self
    }

    fn reusable(mut self, mana_cost: u32) -> Self {
        self.consumable = false;
        self.mana_cost = mana_cost;
        self
    }

    pub fn targeting(&self) -> Targeting {
        if self.directional {
            return Targeting::Direction;
        }
        match self.effect {
            ItemEffect::Teleport { greater: true }
            | ItemEffect::Retreat
            | ItemEffect::Scry
            | ItemEffect::Blink => Targeting::Location,
            _ => Targeting::None,
        }
    }

    /// The melee attack this item grants when wielded.
    pub fn attack(&self) -> Option<Attack> {
        match self.effect {
            ItemEffect::Wield(attack) => Some(attack),
            _ => None,
        }
    }
}

/// A prefix applied to a base weapon, producing one derived weapon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponModifier {
    pub prefix: String,
    pub damage_bonus: u32,
    pub stun_bonus: u32,
    pub value_bonus: u32,
}

/// Ordered, immutable item registry.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    items: Vec<ItemType>,
    by_name: HashMap<String, ItemId>,
}

impl ItemCatalog {
    pub fn builder() -> ItemCatalogBuilder {
        ItemCatalogBuilder::default()
    }

    /// The stock catalog used by generated worlds.
    pub fn standard() -> Self {
        let sharp = WeaponModifier {
            prefix: "sharp".to_string(),
            damage_bonus: 1,
            stun_bonus: 0,
            value_bonus: 25,
        };
        let heavy = WeaponModifier {
            prefix: "heavy".to_string(),
            damage_bonus: 0,
            stun_bonus: 1,
            value_bonus: 40,
        };

        Self::builder()
            .item(
                ItemType::new("key", "Key", "A small, plain key.", 5, ItemEffect::Unlock { magical: false })
                    .directional(),
            )
            .item(
                ItemType::new("m-key", "Magical Key", "A purple glowing key.", 50, ItemEffect::Unlock { magical: true })
                    .directional(),
            )
            .item(ItemType::new(
                "s-seeing",
                "Scroll of Seeing",
                "A blue scroll that allows you to see around corners.",
                10,
                ItemEffect::Seeing { rounds: 2 },
            ))
            .item(ItemType::new(
                "gs-seeing",
                "Greater Scroll of Seeing",
                "A large blue scroll that allows you to see far around corners.",
                35,
                ItemEffect::Seeing { rounds: 3 },
            ))
            .item(ItemType::new(
                "s-reveal",
                "Scroll of Revelation",
                "A green scroll that allows you to see through walls.",
                30,
                ItemEffect::Revelation { greater: false },
            ))
            .item(ItemType::new(
                "gs-reveal",
                "Greater Scroll of Revelation",
                "A large green scroll that allows you to see far through walls.",
                100,
                ItemEffect::Revelation { greater: true },
            ))
            .item(ItemType::new(
                "s-teleport",
                "Scroll of Teleportation",
                "A small yellow scroll that transports the user to undiscovered territory.",
                85,
                ItemEffect::Teleport { greater: false },
            ))
            .item(ItemType::new(
                "gs-teleport",
                "Greater Scroll of Teleportation",
                "A yellow scroll that transports the user wherever they wish.",
                450,
                ItemEffect::Teleport { greater: true },
            ))
            .item(ItemType::new(
                "retreat",
                "Ankh of Retreat",
                "Break in case of emergency.",
                120,
                ItemEffect::Retreat,
            ))
            .item(
                ItemType::new("scry", "Scrying Orb", "A pale blue orb, filled with mists.", 80, ItemEffect::Scry)
                    .reusable(3),
            )
            .item(ItemType::new(
                "blink",
                "Blink Powder",
                "Sprinkling a little of this dust lets you jump about within eye-sight.",
                60,
                ItemEffect::Blink,
            ))
            .item(
                ItemType::new("demo", "Demolition Wand", "Breaks down some walls.", 300, ItemEffect::Demolish)
                    .directional()
                    .reusable(5),
            )
            .item(ItemType::new("potion", "Healing Potion", "A red, bubbling draught.", 15, ItemEffect::Heal))
            .item(ItemType::new(
                "mana-potion",
                "Mana Potion",
                "A cold blue draught.",
                20,
                ItemEffect::RestoreMana,
            ))
            .item({
                let mut bomb = ItemType::new(
                    "stun-bomb",
                    "Stun Bomb",
                    "A clay ball packed with flash powder.",
                    25,
                    ItemEffect::StunBomb,
                )
                .directional();
                bomb.stuns = true;
                bomb
            })
            .weapon("dagger", "Dagger", 20, Attack { damage: 2, stun: 0 })
            .weapon("mace", "Mace", 50, Attack { damage: 3, stun: 1 })
            .weapon("sword", "Sword", 60, Attack { damage: 4, stun: 0 })
            .modifier(sharp)
            .modifier(heavy)
            .build()
    }

    pub fn get(&self, id: ItemId) -> Option<&ItemType> {
        self.items.get(id)
    }

    pub fn id_of(&self, name: &str) -> Option<ItemId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<(ItemId, &ItemType)> {
        let id = self.id_of(name)?;
        Some((id, &self.items[id]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &ItemType)> {
        self.items.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl std::ops::Index<ItemId> for ItemCatalog {
    type Output = ItemType;

    fn index(&self, id: ItemId) -> &ItemType {
        &self.items[id]
    }
}

#[derive(Debug, Default)]
pub struct ItemCatalogBuilder {
    items: Vec<ItemType>,
    weapons: Vec<ItemType>,
    modifiers: Vec<WeaponModifier>,
}

impl ItemCatalogBuilder {
    pub fn item(mut self, item: ItemType) -> Self {
        self.items.push(item);
        self
    }

    pub fn weapon(mut self, name: &str, long_name: &str, value: u32, attack: Attack) -> Self {
        let mut weapon = ItemType::new(
            name,
            long_name,
            "A weapon. Using it wields it.",
            value,
            ItemEffect::Wield(attack),
        );
        weapon.consumable = false;
        weapon.stuns = attack.stun > 0;
        self.weapons.push(weapon);
        self
    }

    pub fn modifier(mut self, modifier: WeaponModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Items first, then each base weapon followed by one derived weapon per
    /// modifier. Modifiers never stack. Later duplicates of a name are
    /// dropped.
    pub fn build(self) -> ItemCatalog {
        let mut items = self.items;
        for base in &self.weapons {
            items.push(base.clone());
            let Some(attack) = base.attack() else {
                continue;
            };
            for modifier in &self.modifiers {
                let derived_attack = Attack {
                    damage: attack.damage + modifier.damage_bonus,
                    stun: attack.stun + modifier.stun_bonus,
                };
                let mut derived = base.clone();
                derived.name = format!("{}-{}", modifier.prefix, base.name);
                derived.long_name = format!("{} {}", capitalize(&modifier.prefix), base.long_name);
                derived.value = base.value + modifier.value_bonus;
                derived.effect = ItemEffect::Wield(derived_attack);
                derived.stuns = derived_attack.stun > 0;
                items.push(derived);
            }
        }

        let mut by_name = HashMap::new();
        items.retain(|item| {
            if by_name.contains_key(&item.name) {
                false
            } else {
                by_name.insert(item.name.clone(), by_name.len());
                true
            }
        });
        ItemCatalog { items, by_name }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Runtime loot container placed on a tile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chest {
    pub items: Vec<ItemId>,
    pub gold: u32,
    pub is_super: bool,
    /// Value the chest was rolled with; items plus gold add up to it.
    pub budget: u32,
}

/// Item counts held by the player. Zero counts never linger.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Inventory {
    counts: BTreeMap<ItemId, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, id: ItemId) -> u32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    pub fn add(&mut self, id: ItemId, amount: u32) {
        if amount > 0 {
            *self.counts.entry(id).or_insert(0) += amount;
        }
    }

    /// Removes one; returns false when none were held.
    pub fn take_one(&mut self, id: ItemId) -> bool {
        match self.counts.get_mut(&id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&id);
                }
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, u32)> + '_ {
        self.counts.iter().map(|(id, count)| (*id, *count))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_ordered() {
        let catalog = ItemCatalog::standard();
        assert_eq!(catalog.id_of("key"), Some(0));
        assert_eq!(catalog.by_name("m-key").unwrap().1.long_name, "Magical Key");
        let mut names: Vec<_> = catalog.iter().map(|(_, i)| i.name.clone()).collect();
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn modifiers_derive_one_flat_item_each() {
        let catalog = ItemCatalog::standard();
        let (_, dagger) = catalog.by_name("dagger").unwrap();
        let (_, sharp) = catalog.by_name("sharp-dagger").unwrap();
        let (_, heavy) = catalog.by_name("heavy-dagger").unwrap();
        assert_eq!(dagger.attack(), Some(Attack { damage: 2, stun: 0 }));
        assert_eq!(sharp.attack(), Some(Attack { damage: 3, stun: 0 }));
        assert_eq!(heavy.attack(), Some(Attack { damage: 2, stun: 1 }));
        assert_eq!(sharp.long_name, "Sharp Dagger");
        assert!(heavy.stuns);
        assert!(catalog.id_of("sharp-heavy-dagger").is_none());
        assert!(catalog.id_of("heavy-sharp-dagger").is_none());
    }

    #[test]
    fn targeting_follows_effect() {
        let catalog = ItemCatalog::standard();
        let targeting = |name: &str| catalog.by_name(name).unwrap().1.targeting();
        assert_eq!(targeting("key"), Targeting::Direction);
        assert_eq!(targeting("demo"), Targeting::Direction);
        assert_eq!(targeting("blink"), Targeting::Location);
        assert_eq!(targeting("gs-teleport"), Targeting::Location);
        assert_eq!(targeting("s-teleport"), Targeting::None);
        assert_eq!(targeting("potion"), Targeting::None);
    }

    #[test]
    fn duplicate_names_keep_the_first() {
        let catalog = ItemCatalog::builder()
            .item(ItemType::new("a", "First", "", 1, ItemEffect::Heal))
            .item(ItemType::new("a", "Second", "", 2, ItemEffect::Heal))
            .build();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].long_name, "First");
    }

    #[test]
    fn inventory_prunes_zero_counts() {
        let mut inv = Inventory::new();
        inv.add(3, 2);
        assert!(inv.take_one(3));
        assert!(inv.take_one(3));
        assert!(!inv.take_one(3));
        assert_eq!(inv.count(3), 0);
        assert!(inv.is_empty());
        inv.add(4, 0);
        assert!(inv.is_empty());
    }
}
