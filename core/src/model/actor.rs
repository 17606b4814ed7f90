// core/src/model/actor.rs

//! The authenticated principal performing an operation. Handlers resolve it at
//! the HTTP boundary and pass it explicitly into every engine call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Customer,
  Vendor,
  Admin,
  SuperUser,
}

impl Role {
  pub fn is_admin(self) -> bool {
    matches!(self, Role::Admin | Role::SuperUser)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Role::Customer => "customer",
      Role::Vendor => "vendor",
      Role::Admin => "admin",
      Role::SuperUser => "super_user",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "customer" => Ok(Role::Customer),
      "vendor" => Ok(Role::Vendor),
      "admin" => Ok(Role::Admin),
      "super_user" => Ok(Role::SuperUser),
      other => Err(format!("unknown role '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub user_id: i64,
  pub role: Role,
  /// The vendor profile owned by this user. Only set for vendors; orders
  /// reference the profile, never the vendor's user id.
  pub vendor_profile_id: Option<i64>,
}

impl Actor {
  pub fn customer(user_id: i64) -> Self {
    Self {
      user_id,
      role: Role::Customer,
      vendor_profile_id: None,
    }
  }

  pub fn vendor(user_id: i64, vendor_profile_id: i64) -> Self {
    Self {
      user_id,
      role: Role::Vendor,
      vendor_profile_id: Some(vendor_profile_id),
    }
  }

  pub fn admin(user_id: i64) -> Self {
    Self {
      user_id,
      role: Role::Admin,
      vendor_profile_id: None,
    }
  }

  pub fn super_user(user_id: i64) -> Self {
    Self {
      user_id,
      role: Role::SuperUser,
      vendor_profile_id: None,
    }
  }

  pub fn is_admin(&self) -> bool {
    self.role.is_admin()
  }

  pub fn owns_vendor(&self, vendor_id: i64) -> bool {
    self.role == Role::Vendor && self.vendor_profile_id == Some(vendor_id)
  }

  pub fn is_customer_of(&self, customer_id: i64) -> bool {
    self.role == Role::Customer && self.user_id == customer_id
  }
}
