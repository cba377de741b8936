use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use izboard_core::{
    config::{ConfigStore, Configuration},
    record::{self, RECORD_BYTES, RECORD_WORDS, RecordError},
};
use log::{debug, info};

const FLASH_SECTOR_SIZE: u32 = 4096;
const DEFAULT_FLASH_CAPACITY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashConfigError {
    PartitionTable,
    ConfigPartitionMissing,
    PartitionTooSmall,
    FlashOpFailed(i32),
    Unsupported,
    Record(RecordError),
}

/// Partition-table reads go through a bounce buffer of this many words.
const READ_CHUNK_WORDS: usize = 16;

fn rom_result(rc: i32) -> Result<(), FlashConfigError> {
    if rc == ESP_ROM_SPIFLASH_RESULT_OK {
        Ok(())
    } else {
        Err(FlashConfigError::FlashOpFailed(rc))
    }
}

/// Flash seen through the ROM SPI flash routines; word addressed only.
#[derive(Debug)]
struct RomFlash;

impl RomFlash {
    fn unlocked() -> Result<Self, FlashConfigError> {
        rom_result(unsafe { esp_rom_spiflash_unlock() })?;
        Ok(Self)
    }

    fn erase_sector(&mut self, addr: u32) -> Result<(), FlashConfigError> {
        if !addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashConfigError::Unsupported);
        }
        rom_result(unsafe { esp_rom_spiflash_erase_sector(addr / FLASH_SECTOR_SIZE) })
    }

    fn read_words(&mut self, addr: u32, words: &mut [u32]) -> Result<(), FlashConfigError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashConfigError::Unsupported);
        }
        let len = words.len() * 4;
        rom_result(unsafe {
            esp_rom_spiflash_read(addr, words.as_mut_ptr() as *const u32, len as _)
        })
    }

    fn write_words(&mut self, addr: u32, words: &[u32]) -> Result<(), FlashConfigError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashConfigError::Unsupported);
        }
        let len = words.len() * 4;
        rom_result(unsafe { esp_rom_spiflash_write(addr, words.as_ptr(), len as _) })
    }
}

impl ReadStorage for RomFlash {
    type Error = FlashConfigError;

    /// Word-aligned offsets and lengths only, which is all the partition
    /// table reader asks for.
    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if !bytes.len().is_multiple_of(4) {
            return Err(FlashConfigError::Unsupported);
        }

        let mut words = [0u32; READ_CHUNK_WORDS];
        let mut addr = offset;
        for chunk in bytes.chunks_mut(READ_CHUNK_WORDS * 4) {
            let words = &mut words[..chunk.len() / 4];
            self.read_words(addr, words)?;
            for (dst, word) in chunk.chunks_exact_mut(4).zip(words.iter()) {
                dst.copy_from_slice(&word.to_le_bytes());
            }
            addr += chunk.len() as u32;
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        DEFAULT_FLASH_CAPACITY_BYTES
    }
}

impl Storage for RomFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err(FlashConfigError::Unsupported)
    }
}

/// Configuration record kept in the last sector of a data partition.
///
/// The partition table is read on first access, so construction never
/// fails and a damaged table surfaces as a load error.
#[derive(Debug, Default)]
pub struct FlashConfigStore {
    located: Option<(RomFlash, u32)>,
}

impl FlashConfigStore {
    pub const fn new() -> Self {
        Self { located: None }
    }

    fn sector(&mut self) -> Result<(&mut RomFlash, u32), FlashConfigError> {
        if self.located.is_none() {
            let mut flash = RomFlash::unlocked()?;
            let addr = locate_config_sector(&mut flash)?;
            debug!("store: config sector at {:#x}", addr);
            self.located = Some((flash, addr));
        }

        match &mut self.located {
            Some((flash, addr)) => Ok((flash, *addr)),
            None => Err(FlashConfigError::ConfigPartitionMissing),
        }
    }
}

/// Last sector of the first writable undefined data partition, else of the
/// first NVS partition.
fn locate_config_sector(flash: &mut RomFlash) -> Result<u32, FlashConfigError> {
    let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
    let table = read_partition_table(flash, &mut table_buf)
        .map_err(|_| FlashConfigError::PartitionTable)?;

    let mut data_undefined: Option<(u32, u32)> = None;
    let mut fallback_nvs: Option<(u32, u32)> = None;

    for entry in table.iter() {
        if entry.is_read_only() {
            continue;
        }

        match entry.partition_type() {
            PartitionType::Data(DataPartitionSubType::Undefined) => {
                data_undefined = Some((entry.offset(), entry.len()));
                break;
            }
            PartitionType::Data(DataPartitionSubType::Nvs) if fallback_nvs.is_none() => {
                fallback_nvs = Some((entry.offset(), entry.len()));
            }
            _ => {}
        }
    }

    let (offset, len) = data_undefined
        .or(fallback_nvs)
        .ok_or(FlashConfigError::ConfigPartitionMissing)?;

    if len < FLASH_SECTOR_SIZE {
        return Err(FlashConfigError::PartitionTooSmall);
    }

    Ok(offset + len - FLASH_SECTOR_SIZE)
}

impl ConfigStore for FlashConfigStore {
    type Error = FlashConfigError;

    fn load(&mut self) -> Result<Option<Configuration>, Self::Error> {
        let (flash, addr) = self.sector()?;
        let mut words = [0u32; RECORD_WORDS];
        flash.read_words(addr, &mut words)?;

        record::decode(&record::from_words(&words)).map_err(FlashConfigError::Record)
    }

    fn save(&mut self, config: &Configuration) -> Result<(), Self::Error> {
        let mut buf = [0xFFu8; RECORD_BYTES];
        let len = record::encode(config, &mut buf).map_err(FlashConfigError::Record)?;

        // Only the words covering the record are programmed; the rest stay erased.
        let words = record::to_words(&buf);
        let used_words = len.div_ceil(4);

        let (flash, addr) = self.sector()?;
        flash.erase_sector(addr)?;
        flash.write_words(addr, &words[..used_words])?;
        info!("store: saved {} byte config record", len);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        let (flash, addr) = self.sector()?;
        flash.erase_sector(addr)?;
        info!("store: config sector erased");
        Ok(())
    }
}
