//! # Behaviours and Components
//!
//! A node may carry one [`Behaviour`]: the object that implements its hook
//! table. When a behaviour is attached through `add_component` it becomes a
//! component, keyed on its concrete Rust type, so an entity holds at most one
//! component per type.

use std::any::{type_name, Any, TypeId};
use std::fmt;

use super::context::HookContext;
use crate::error::HookResult;

/// Upcast helper so behaviours can be downcast back to their concrete type.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Returns `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The hooks a node can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Fired once, right after construction.
    Create,
    /// Fired once when a collaborator reports the node's resources ready.
    Load,
    /// Fired when the node becomes visible.
    Show,
    /// Fired when the node becomes hidden.
    Hide,
    /// Fired every tick in the update pass.
    Update,
    /// Fired every tick in the late update pass.
    LateUpdate,
    /// Fired first during disposal.
    Teardown,
}

impl Hook {
    /// The capability flag that gates this hook.
    #[inline]
    #[must_use]
    pub const fn capability(self) -> Capabilities {
        match self {
            Self::Create => Capabilities::CREATE,
            Self::Load => Capabilities::LOAD,
            Self::Show => Capabilities::SHOW,
            Self::Hide => Capabilities::HIDE,
            Self::Update => Capabilities::UPDATE,
            Self::LateUpdate => Capabilities::LATE_UPDATE,
            Self::Teardown => Capabilities::TEARDOWN,
        }
    }
}

/// Bitmask of the hooks a behaviour implements.
///
/// Read once when the node is constructed. Hooks whose flag is absent are
/// skipped, and the lifecycle driver only iterates nodes tagged with
/// [`UPDATE`](Self::UPDATE) / [`LATE_UPDATE`](Self::LATE_UPDATE).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No hooks.
    pub const NONE: Self = Self(0);
    /// `on_create`.
    pub const CREATE: Self = Self(1 << 0);
    /// `on_load`.
    pub const LOAD: Self = Self(1 << 1);
    /// `on_show`.
    pub const SHOW: Self = Self(1 << 2);
    /// `on_hide`.
    pub const HIDE: Self = Self(1 << 3);
    /// `update`.
    pub const UPDATE: Self = Self(1 << 4);
    /// `late_update`.
    pub const LATE_UPDATE: Self = Self(1 << 5);
    /// `on_teardown`.
    pub const TEARDOWN: Self = Self(1 << 6);
    /// Every hook.
    pub const ALL: Self = Self(0b0111_1111);

    /// Returns true if every flag in `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both masks.
    #[inline]
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if no flag is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 7] = [
            "CREATE",
            "LOAD",
            "SHOW",
            "HIDE",
            "UPDATE",
            "LATE_UPDATE",
            "TEARDOWN",
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.0 & (1 << bit) != 0)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Capabilities({})", set.join(" | "))
    }
}

/// Hook table of a node.
///
/// Every hook has a no-op default; a behaviour overrides the ones it needs
/// and declares them in [`capabilities`](Self::capabilities). Hooks run on
/// the driving thread, never suspend, and receive a [`HookContext`] giving
/// mutable access to the world. While a hook runs, the behaviour is checked
/// out of its node, so `world.component::<Self>()` on the node itself yields
/// `None` for the duration of the call.
///
/// # Example
///
/// ```rust,ignore
/// struct Spinner { angle: f32 }
///
/// impl Behaviour for Spinner {
///     fn capabilities(&self) -> Capabilities {
///         Capabilities::UPDATE
///     }
///
///     fn update(&mut self, _ctx: &mut HookContext<'_>, dt: f32) -> HookResult {
///         self.angle += dt;
///         Ok(())
///     }
/// }
/// ```
#[allow(unused_variables)]
pub trait Behaviour: AsAny + Send {
    /// Hooks this behaviour implements.
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Fired once after construction. Sibling components attached before
    /// this one are already visible.
    fn on_create(&mut self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(())
    }

    /// Fired once when the node's resources are ready.
    fn on_load(&mut self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(())
    }

    /// Fired when the node becomes visible.
    fn on_show(&mut self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(())
    }

    /// Fired when the node becomes hidden.
    fn on_hide(&mut self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(())
    }

    /// Per-frame update.
    fn update(&mut self, ctx: &mut HookContext<'_>, dt: f32) -> HookResult {
        Ok(())
    }

    /// Per-frame late update, after every node's `update`.
    fn late_update(&mut self, ctx: &mut HookContext<'_>, dt: f32) -> HookResult {
        Ok(())
    }

    /// Fired first during disposal. Components and children are still
    /// attached.
    fn on_teardown(&mut self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(())
    }
}

/// Type key of a component slot.
#[derive(Clone, Copy)]
pub struct ComponentKey {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentKey {
    /// Key for component type `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Type name, for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentKey {}

impl std::hash::Hash for ComponentKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
